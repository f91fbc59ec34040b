use clap::Parser;
use color_eyre::Result;
use ytc::{
    init_errors,
    init_logging,
    App,
    Args,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_errors()?;
    init_logging(args.log_level.as_deref())?;
    App::new(args).run().await
}
