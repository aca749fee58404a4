//! Property tests for bundle assembly

mod common;

use common::{unsigned_payment, EventLog, FakeTipEstimator, LocalCustodian};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use txpipe::signer::RemoteSigningClient;
use txpipe::tx_builder::{BundleAssembler, TipPolicy, TipSource};
use txpipe::types::UnsignedTransaction;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn tipped_bundle_keeps_order_and_blockhash(
        count in 1usize..=4,
        hint in proptest::option::of(any::<u64>()),
        estimate in proptest::option::of(0u64..50_000_000),
    ) {
        let custodian = Arc::new(LocalCustodian::new(&["alice"], Duration::ZERO, EventLog::default()));
        let wallet = custodian.wallet("alice");
        let signer = RemoteSigningClient::new(custodian);
        let policy = TipPolicy::default();
        let assembler = BundleAssembler::new(
            signer.clone(),
            Arc::new(FakeTipEstimator(estimate)),
            policy.clone(),
        );

        let rt = runtime();
        let bundle = rt.block_on(async {
            let mut signed = Vec::new();
            for i in 0..count {
                let unsigned = UnsignedTransaction::from_base64(&unsigned_payment(&wallet.address, 1 + i as u64)).unwrap();
                signed.push(signer.sign(&wallet, &unsigned).await.unwrap());
            }
            assembler.assemble(signed, true, &wallet, hint).await.unwrap()
        });

        let ordered = bundle.ordered();
        prop_assert_eq!(ordered.len(), count + 1);

        let tip = bundle.tip().unwrap();
        prop_assert_eq!(ordered[0].signature(), tip.transaction.signature());
        prop_assert_eq!(ordered[0].blockhash(), ordered[1].blockhash());
        prop_assert!(tip.lamports >= policy.min_tip_lamports);
        prop_assert!(tip.lamports <= policy.max_tip_lamports);
        prop_assert!(policy.tip_accounts.contains(&tip.recipient));

        let expected_source = match (hint, estimate) {
            (Some(_), _) => TipSource::Hint,
            (None, Some(_)) => TipSource::Estimate,
            (None, None) => TipSource::Fallback,
        };
        prop_assert_eq!(tip.source, expected_source);

        let user: Vec<String> = ordered[1..].iter().map(|tx| tx.signature().to_string()).collect();
        prop_assert_eq!(user, bundle.user_signatures());
    }

    #[test]
    fn untipped_bundle_is_passed_through(count in 1usize..=5) {
        let custodian = Arc::new(LocalCustodian::new(&["alice"], Duration::ZERO, EventLog::default()));
        let wallet = custodian.wallet("alice");
        let signer = RemoteSigningClient::new(custodian);
        let assembler = BundleAssembler::new(
            signer.clone(),
            Arc::new(FakeTipEstimator(Some(10_000))),
            TipPolicy::default(),
        );

        let rt = runtime();
        let bundle = rt.block_on(async {
            let mut signed = Vec::new();
            for i in 0..count {
                let unsigned = UnsignedTransaction::from_base64(&unsigned_payment(&wallet.address, 1 + i as u64)).unwrap();
                signed.push(signer.sign(&wallet, &unsigned).await.unwrap());
            }
            assembler.assemble(signed, false, &wallet, None).await.unwrap()
        });

        prop_assert!(bundle.tip().is_none());
        prop_assert_eq!(bundle.len(), count);
    }
}
