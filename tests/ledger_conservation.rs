mod common;

use imagegen_server::db::stores::LedgerStore;
use imagegen_server::db::MemoryStore;
use imagegen_server::error::AppError;
use imagegen_server::models::{CreditTransactionType, LedgerEntry};
use proptest::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Op {
    Credit(i64),
    Debit(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..5_000).prop_map(Op::Credit),
        (1i64..5_000).prop_map(Op::Debit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever mix of credits and debits runs through the ledger API, the stored
    /// balance equals the sum of ledger rows and never goes negative.
    #[test]
    fn balance_always_matches_ledger(bonus in 0i64..500, ops in prop::collection::vec(op(), 0..40)) {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let user_id = Uuid::new_v4();
            common::seed_user(&store, user_id, bonus).await;

            let mut expected = bonus;
            for op in &ops {
                match *op {
                    Op::Credit(amount) => {
                        let entry = LedgerEntry::new(user_id, amount, CreditTransactionType::Purchase, "Credit purchase");
                        let receipt = store.credit(&entry).await.unwrap();
                        expected += amount;
                        assert_eq!(receipt.balance, expected);
                    }
                    Op::Debit(amount) => {
                        let entry = LedgerEntry::new(user_id, amount, CreditTransactionType::Usage, "Image generation");
                        match store.debit(&entry).await {
                            Ok(receipt) => {
                                expected -= amount;
                                assert_eq!(receipt.balance, expected);
                            }
                            Err(AppError::InsufficientCredits { required, available }) => {
                                assert_eq!(required, amount);
                                assert_eq!(available, expected);
                                assert!(amount > expected);
                            }
                            Err(other) => panic!("unexpected ledger error: {}", other),
                        }
                    }
                }
                assert!(expected >= 0);
            }

            let balance = store.balance(user_id).await.unwrap();
            let ledger_sum: i64 = store.all_transactions(user_id).await.iter().map(|t| t.amount).sum();
            assert_eq!(balance, expected);
            assert_eq!(ledger_sum, balance);
            assert!(store.find_discrepancies().await.unwrap().is_empty());
        });
    }
}
