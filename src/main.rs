//! agentmetrics entry point.

use agentmetrics_lib::cli::{self, Cli};
use agentmetrics_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
