//! The fixed worker binary: reads one task unit from stdin, evaluates it,
//! prints one result unit to stdout, exits. See `offload::worker`.

use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    #[cfg(feature = "logging")]
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let code = offload::worker::run().await;
    ExitCode::from(code as u8)
}
