//! Order processing chain that picks its payment branch at runtime.
//!
//! Demonstrates:
//! - Splicing a chain in from a running step with `resolve_then_append`
//! - Running blocking work on a dedicated `SerialLane`
//! - A deadline driven by `cancel_after`

use std::sync::Arc;
use std::time::Duration;
use stepchain::prelude::*;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
enum PaymentMethod {
    CreditCard,
    BankTransfer,
}

#[derive(Debug, Clone)]
struct Order {
    id: String,
    total_amount: f64,
    payment_method: PaymentMethod,
}

#[derive(Debug, Clone)]
struct Receipt {
    order_id: String,
    transaction_id: String,
    status: &'static str,
}

fn card_branch() -> StepChain<Order, Receipt> {
    StepChain::named("charge_card", |h: StepHandle<Order, Receipt>| {
        println!("Charging card for order {}...", h.input().id);
        let receipt = Receipt {
            order_id: h.input().id.clone(),
            transaction_id: "CC-TRANS-123".to_string(),
            status: "SUCCESS",
        };
        h.resolve(receipt);
    })
}

fn bank_branch() -> StepChain<Order, Receipt> {
    StepChain::named("request_transfer", |h: StepHandle<Order, Receipt>| {
        println!("Requesting bank transfer for order {}...", h.input().id);
        let receipt = Receipt {
            order_id: h.input().id.clone(),
            transaction_id: "BT-TRANS-456".to_string(),
            status: "PENDING",
        };
        h.resolve(receipt);
    })
}

fn order_chain(archive: Arc<dyn Lane>) -> StepChain<Order, Order> {
    let archive_receipt = StepChain::from(
        StepNode::new(|h: StepHandle<Receipt, ()>| {
            // Stands in for a blocking write.
            std::thread::sleep(Duration::from_millis(10));
            let receipt = h.input();
            println!(
                "Archived {} for order {} ({})",
                receipt.transaction_id, receipt.order_id, receipt.status
            );
            h.resolve(());
        })
        .with_name("archive_receipt")
        .with_lane(archive),
    );

    StepChain::named("validate", |h: StepHandle<Order, Order>| {
        println!("Validating order {}...", h.input().id);
        if h.input().total_amount <= 0.0 {
            h.fail(format!("Invalid order amount: {}", h.input().total_amount));
            return;
        }
        h.resolve(h.input().clone());
    })
    .then_named("route_payment", move |h: StepHandle<Order, Order>| {
        let order = h.input().clone();
        let branch = match order.payment_method {
            PaymentMethod::CreditCard => card_branch(),
            PaymentMethod::BankTransfer => bank_branch(),
        };
        h.resolve_then_append(order, branch.then_chain(archive_receipt));
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let archive: Arc<dyn Lane> = Arc::new(SerialLane::new("archive")?);
    let orders = vec![
        Order {
            id: "ORD-001".to_string(),
            total_amount: 99.5,
            payment_method: PaymentMethod::CreditCard,
        },
        Order {
            id: "ORD-002".to_string(),
            total_amount: 250.0,
            payment_method: PaymentMethod::BankTransfer,
        },
        Order {
            id: "ORD-003".to_string(),
            total_amount: 0.0,
            payment_method: PaymentMethod::CreditCard,
        },
    ];

    for order in orders {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = order.id.clone();
        let chain = order_chain(archive.clone())
            .on_error(|error| eprintln!("Order failed: {}", error))
            .finally(move |state| {
                let _ = tx.send(state);
            });

        let deadline = cancel_after(
            chain.cancellation_token(),
            Duration::from_secs(2),
            "order deadline exceeded",
        );
        chain.start(order)?;

        match rx.recv().await {
            Some(state) => println!("Order {} finished: {}", id, state),
            None => eprintln!("Order {} never finished", id),
        }
        deadline.abort();
    }

    Ok(())
}
