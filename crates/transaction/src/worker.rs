use std::thread::{self, JoinHandle};

use common::DbResult;
use tracing::warn;

use crate::Transaction;

/// Runs a batch of transactions on a dedicated OS thread. Workers may run
/// in parallel; record locks arbitrate between them.
pub struct TransactionWorker {
    transactions: Vec<Transaction>,
    handle: Option<JoinHandle<usize>>,
    committed: usize,
}

impl TransactionWorker {
    pub fn new() -> Self {
        Self {
            transactions: Vec::new(),
            handle: None,
            committed: 0,
        }
    }

    pub fn add(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    /// Spawn the worker thread. Each queued transaction runs in order;
    /// aborted transactions are counted out, fatal errors are logged and
    /// skip the transaction.
    pub fn run(&mut self) -> DbResult<()> {
        let transactions = std::mem::take(&mut self.transactions);
        self.handle = Some(
            thread::Builder::new()
                .name("txn-worker".into())
                .spawn(move || {
                    let mut committed = 0;
                    for transaction in &transactions {
                        match transaction.run() {
                            Ok(true) => committed += 1,
                            Ok(false) => {}
                            Err(e) => {
                                warn!(tx = transaction.id(), error = %e, "transaction failed");
                            }
                        }
                    }
                    committed
                })?,
        );
        Ok(())
    }

    /// Wait for the worker thread and return how many transactions
    /// committed.
    pub fn join(&mut self) -> usize {
        if let Some(handle) = self.handle.take() {
            self.committed = handle.join().unwrap_or(0);
        }
        self.committed
    }

    pub fn committed(&self) -> usize {
        self.committed
    }
}

impl Default for TransactionWorker {
    fn default() -> Self {
        Self::new()
    }
}
