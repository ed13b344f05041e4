use proptest::prelude::*;

use idgate_types::{DocumentType, Timestamp, WalletAddress};

proptest! {
    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// Wallet equality ignores ASCII case.
    #[test]
    fn wallet_equality_ignores_case(raw in "0x[0-9a-fA-F]{1,40}") {
        let a = WalletAddress::new(raw.clone()).unwrap();
        let b = WalletAddress::new(raw.to_ascii_uppercase()).unwrap();
        prop_assert_eq!(a, b);
    }

    /// Non-blank document types always construct and keep their text.
    #[test]
    fn document_type_keeps_trimmed_text(raw in "[A-Za-z][A-Za-z ']{0,30}") {
        let t = DocumentType::new(raw.clone()).unwrap();
        prop_assert_eq!(t.as_str(), raw.trim());
    }
}
