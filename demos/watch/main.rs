use std::net::IpAddr;
use std::time::Duration;

use ping_sweep::{Config, PingEngine, ResultCode};

#[derive(argh::FromArgs)]
/// sweep - periodically probe IP addresses and print each outcome
struct Args {
    #[argh(option, short = 'i', default = "1000")]
    /// milliseconds between probe rounds
    interval_ms: u64,

    #[argh(option, short = 'c', default = "16")]
    /// stop after this many results
    count: usize,

    #[argh(positional)]
    /// IP addresses
    addresses: Vec<String>,
}

fn main() -> ping_sweep::Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let args: Args = argh::from_env();

    let config = Config {
        interval: Duration::from_millis(args.interval_ms),
        ..Config::default()
    };
    let mut engine = PingEngine::new(config);

    for address in &args.addresses {
        let address: IpAddr = address
            .parse()
            .unwrap_or_else(|_| panic!("not an IP address: {address}"));
        engine.add_target(address)?;
    }

    engine.start()?;

    for _ in 0..args.count {
        let result = engine.next_result()?;
        match (result.code, result.responder) {
            (ResultCode::Ok | ResultCode::TimeExceeded, Some(responder)) => println!(
                "sample {:<4} {:?} from {} in {:?}",
                result.sample_number, result.code, responder, result.round_trip
            ),
            _ => println!(
                "sample {:<4} {:?} for {} after {:?}",
                result.sample_number,
                result.code,
                result.target.host_address(),
                result.round_trip
            ),
        }
    }

    engine.stop()
}
