use promises::*;
use std::time::Duration;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Mode {
    /// Wait for every image; fail on the first broken one
    All,
    /// Whichever image settles first
    Race,
    /// First image that loads; fail only if every image fails
    Any,
    /// Report the outcome of every image
    Settled,
}

#[derive(clap::Parser)]
#[command(name = "promises", version, about = "Preload simulated images through promise combinators")]
struct Cli {
    /// Number of images to load
    #[arg(short, long, default_value_t = 4)]
    images: usize,

    /// Base load time per image in milliseconds; later images load faster
    #[arg(short, long, default_value_t = 20)]
    delay_ms: u64,

    /// Index of an image that fails to load
    #[arg(short, long)]
    fail_at: Option<usize>,

    /// How the loads are combined
    #[arg(short, long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Abort after executing this many jobs
    #[arg(long)]
    task_budget: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    // Initialize logger (controlled by RUST_LOG)
    env_logger::init();

    let cli = <Cli as clap::Parser>::parse();
    let event_loop = EventLoop::with_config(LoopConfig {
        task_budget: cli.task_budget,
        wait_for_timers: true,
    });
    let scheduler = event_loop.scheduler();

    let loads: Vec<Promise> = (0..cli.images).map(|index| load_image(&event_loop, &cli, index)).collect();
    let combined = match cli.mode {
        Mode::All => Promise::all(&scheduler, loads),
        Mode::Race => Promise::race(&scheduler, loads),
        Mode::Any => Promise::any(&scheduler, loads),
        Mode::Settled => Promise::all_settled(&scheduler, loads),
    };

    let executed = match event_loop.run() {
        Ok(executed) => executed,
        Err(err) => {
            eprintln!("{}", err.user_message());
            std::process::exit(1);
        }
    };
    log::debug!("event loop finished after {executed} jobs");

    match (combined.state(), combined.value()) {
        (PromiseState::Fulfilled, Some(value)) => println!("{}", serde_json::to_string_pretty(&value.to_json())?),
        (PromiseState::Rejected, Some(reason)) => {
            eprintln!("Uncaught (in promise) {}", value_to_string(&reason));
            std::process::exit(1);
        }
        _ => {
            eprintln!("Promise never settled");
            std::process::exit(2);
        }
    }
    Ok(())
}

fn load_image(event_loop: &EventLoop, cli: &Cli, index: usize) -> Promise {
    let delay = load_delay(cli.delay_ms, cli.images, index);
    let src = format!("image-{index}.png");
    if cli.fail_at == Some(index) {
        delayed_reject(event_loop, delay, ErrorObject::new("Error", format!("Failed to load {src}")))
    } else {
        delayed(event_loop, delay, src)
    }
}

/// Later images load faster, so results arrive out of input order.
fn load_delay(delay_ms: u64, images: usize, index: usize) -> Duration {
    let steps = u64::try_from(images.saturating_sub(index)).unwrap_or(u64::MAX);
    Duration::from_millis(delay_ms.saturating_mul(steps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_delays_shrink_with_the_index() {
        assert_eq!(load_delay(20, 4, 0), Duration::from_millis(80));
        assert_eq!(load_delay(20, 4, 3), Duration::from_millis(20));
    }

    #[test]
    fn huge_delays_saturate() {
        assert_eq!(load_delay(u64::MAX, 4, 0), Duration::from_millis(u64::MAX));
    }
}
