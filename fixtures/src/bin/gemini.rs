use clap::Parser;
use fixtures::{gemini::GeminiFixture, run_server, FixtureArgs};

/// Scripted Gemini fixture server
#[derive(Parser, Debug)]
#[clap(name = "gemini-fixture")]
struct Cli {
    #[clap(flatten)]
    common: FixtureArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    run_server(args.common, GeminiFixture::new().router()).await
}
