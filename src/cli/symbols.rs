//! Symbols command implementation

use crate::catalog::Catalog;
use crate::config::Config;
use clap::Args;

#[derive(Args, Debug)]
pub struct SymbolsArgs {
    /// Only print the count per asset
    #[arg(long)]
    pub count: bool,
}

impl SymbolsArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let assets = config.catalog.assets.clone();
        let catalog = Catalog::new(config.catalog)?;
        let symbols = catalog.fetch_symbols().await?;

        if self.count {
            for asset in &assets {
                let prefix = format!("{}-", asset);
                let n = symbols.iter().filter(|s| s.starts_with(&prefix)).count();
                println!("{}: {}", asset, n);
            }
            println!("total: {}", symbols.len());
        } else {
            for symbol in &symbols {
                println!("{}", symbol);
            }
        }
        Ok(())
    }
}
