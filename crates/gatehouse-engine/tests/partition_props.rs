//! Random command and scan sequences never place an identifier in two sets.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{id, Harness};
use gatehouse_core::CredentialSet;
use proptest::prelude::*;
use serde_json::json;

const POOL: [&str; 4] = ["AABBCCDD", "11223344", "DEADBEEF", "0102030405060708"];

#[derive(Debug, Clone)]
enum Step {
    Scan(usize),
    Add(CredentialSet, usize),
    Delete(CredentialSet, usize),
    Move(CredentialSet, CredentialSet, usize),
}

fn set() -> impl Strategy<Value = CredentialSet> {
    prop_oneof![
        Just(CredentialSet::Allow),
        Just(CredentialSet::Deny),
        Just(CredentialSet::Pending),
    ]
}

fn step() -> impl Strategy<Value = Step> {
    let index = 0..POOL.len();
    prop_oneof![
        index.clone().prop_map(Step::Scan),
        (set(), index.clone()).prop_map(|(s, i)| Step::Add(s, i)),
        (set(), index.clone()).prop_map(|(s, i)| Step::Delete(s, i)),
        (set(), set(), index).prop_map(|(from, to, i)| Step::Move(from, to, i)),
    ]
}

async fn run(steps: Vec<Step>) -> Harness {
    let mut h = Harness::new();
    for step in steps {
        match step {
            Step::Scan(i) => {
                h.scan(POOL[i]);
                h.run_control(10);
            }
            Step::Add(set, i) => {
                h.apply("add", json!({"set": set.as_str(), "identifier": POOL[i]}))
                    .await;
            }
            Step::Delete(set, i) => {
                h.apply("delete", json!({"set": set.as_str(), "identifier": POOL[i]}))
                    .await;
            }
            Step::Move(from, to, i) => {
                h.apply(
                    "move",
                    json!({"from": from.as_str(), "to": to.as_str(), "identifier": POOL[i]}),
                )
                .await;
            }
        }
    }
    h
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn sets_stay_disjoint(steps in prop::collection::vec(step(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let h = runtime.block_on(run(steps));

        for raw in POOL {
            let sets = h.node.registry.membership(&id(raw));
            prop_assert!(sets.len() <= 1, "{raw} in {sets:?}");
        }
        for set in CredentialSet::ALL {
            let persisted = h.storage.snapshot(set);
            prop_assert_eq!(&persisted, &h.node.registry.entries(set).unwrap());
        }
    }
}
