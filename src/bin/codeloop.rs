use anyhow::Result;
use clap::Parser;
use codeloop::app::App;
use codeloop::config::{Cli, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load()?;
    config.apply_cli(&cli);
    config.validate()?;

    let mut app = App::new(config)?;
    app.run(cli.message).await?;

    Ok(())
}
