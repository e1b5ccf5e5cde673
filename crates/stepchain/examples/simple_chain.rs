//! Simple three-step chain mixing closure steps and an async step.

use async_trait::async_trait;
use std::time::Duration;
use stepchain::prelude::*;
use tokio::sync::mpsc;

#[derive(Debug)]
struct DataLoadStep;

#[async_trait]
impl Step<u32, Vec<u32>> for DataLoadStep {
    async fn execute(&self, count: u32) -> Result<Vec<u32>, BoxError> {
        println!("Loading {} records...", count);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok((1..=count).collect())
    }

    fn name(&self) -> StepName {
        StepName::new("DataLoadStep")
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let (tx, mut rx) = mpsc::unbounded_channel();

    let chain = StepChain::from_async(DataLoadStep)
        .then_named("sum", |h: StepHandle<Vec<u32>, u64>| {
            let total = h.input().iter().map(|&n| u64::from(n)).sum();
            h.resolve(total);
        })
        .then_named("report", |h: StepHandle<u64, ()>| {
            println!("Total: {}", h.input());
            h.resolve(());
        })
        .on_error(|error| eprintln!("Chain failed: {}", error))
        .finally(move |state| {
            let _ = tx.send(state);
        });

    chain.start(10)?;

    match rx.recv().await {
        Some(state) => println!("Chain finished: {}", state),
        None => eprintln!("Chain dropped without finishing"),
    }

    println!("{}", serde_json::to_string_pretty(&chain.snapshot())?);
    Ok(())
}
