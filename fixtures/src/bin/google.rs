use clap::Parser;
use fixtures::{google::GoogleFixture, run_server, FixtureArgs};

/// Google OAuth + Drive fixture server
#[derive(Parser, Debug)]
#[clap(name = "google-fixture")]
struct Cli {
    #[clap(flatten)]
    common: FixtureArgs,

    /// Lifetime in seconds of issued access tokens
    #[arg(long, default_value = "3600")]
    token_lifetime: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let fixture = GoogleFixture::new();
    fixture.set_token_lifetime(args.token_lifetime);

    run_server(args.common, fixture.router()).await
}
