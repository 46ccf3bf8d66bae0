use rewrap::Dispatcher;
use tracing_subscriber::EnvFilter;

// text files in the input dir
const ELDRITCH_TEXTS: [&str; 3] = [
    "at_the_mountains_of_madness.txt", // longest
    "the_shadow_over_innsmouth.txt",   // median
    "the_call_of_cthulhu.txt",         // shortest
];

#[tokio::main]
async fn main() -> Result<(), rewrap::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    Dispatcher::default().run(&ELDRITCH_TEXTS).await?;

    Ok(())
}
