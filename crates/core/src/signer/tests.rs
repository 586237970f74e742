use base58::ToBase58;
use residentity_crypto::{generate_signing_key, Ed25519SigningKey, HashAlgorithm};
use residentity_types::Transaction;
use serde_json::json;

use super::*;
use crate::canonical::canonical_string;

/// シード 0x00..0x1f から導出される公開鍵
const PUB: &str = "FAe4sisG95oZ42w7buUn5qEE4TAnfTTFPiguZUHmhiF";
const SEED: &str = "1thX6LZfHDZZKUs92febYZhYRcXddmzfzF2NvTkPNE";
const DIGEST: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

const SHA256_FULFILLMENT: &str = "pGSAIAOhB7_zzhC-HXDdGOdLwJln5NYwm6UNXx3chmQSVTG4gUD_e3Wpe7v5OmYNy0gk4UkF73Aozbc5uX6HrmJndi9dPDnSufu-z8vUcWqr8GdIpPjJaBcWBVhDRCqoA3VCCdsI";
const SHA3_FULFILLMENT: &str = "pGSAIAOhB7_zzhC-HXDdGOdLwJln5NYwm6UNXx3chmQSVTG4gUC8MOCnK282wG5IgwEeS1mDfQIpdmPtUNC8j85OK1b-BocRMMTj5iPGULortrckBCW2A4_D8T-tEz9ZnJ3d7i0O";

fn fixed_key() -> Ed25519SigningKey {
    let mut seed = [0u8; 32];
    for (i, b) in seed.iter_mut().enumerate() {
        *b = i as u8;
    }
    Ed25519SigningKey::from_bytes(&seed)
}

/// `prepare` が返す形の未署名トランザクション
fn prepared_tx(owners: &[&str]) -> Transaction {
    let inputs: Vec<serde_json::Value> = owners
        .iter()
        .map(|owner| json!({"owners_before": [owner], "fulfills": null, "fulfillment": null}))
        .collect();
    serde_json::from_value(json!({
        "id": null,
        "version": "2.0",
        "operation": "CREATE",
        "inputs": inputs,
        "outputs": [{
            "public_keys": [PUB],
            "condition": {
                "uri": "ni:///sha-256;x?fpt=ed25519-sha-256&cost=131072",
                "details": {"type": "ed25519-sha-256", "public_key": PUB},
            },
            "amount": "1",
        }],
        "asset": {"data": {
            "file_name": "nda.pdf",
            "document_digest": DIGEST,
            "title": "契約書 \"v2\"\n✓",
        }},
        "metadata": {
            "signed_at": 1700000000,
            "ratio": 0.5,
            "tags": ["b", "a"],
            "nested": {"z": true, "a": [{"y": 1, "x": 2}]},
        },
    }))
    .unwrap()
}

#[test]
fn test_fixed_key_derivation() {
    let key = fixed_key();
    assert_eq!(key.to_bytes().to_base58(), SEED);
    let keys = KeyMap::from_seed(SEED).unwrap();
    assert!(keys.contains(PUB));
    assert_eq!(keys.len(), 1);
}

/// 署名対象のバイト列がブラウザ実装の出力と一致することを確認
#[test]
fn test_pre_fulfillment_message() {
    let tx = prepared_tx(&[PUB]);
    let expected = format!(
        concat!(
            r#"{{"asset":{{"data":{{"document_digest":"{digest}","file_name":"nda.pdf","title":"契約書 \"v2\"\n✓"}}}},"#,
            r#""id":null,"inputs":[{{"fulfillment":null,"fulfills":null,"owners_before":["{pk}"]}}],"#,
            r#""metadata":{{"nested":{{"a":[{{"x":2,"y":1}}],"z":true}},"ratio":0.5,"signed_at":1700000000,"tags":["b","a"]}},"#,
            r#""operation":"CREATE","outputs":[{{"amount":"1","condition":{{"details":{{"public_key":"{pk}","type":"ed25519-sha-256"}},"#,
            r#""uri":"ni:///sha-256;x?fpt=ed25519-sha-256&cost=131072"}},"public_keys":["{pk}"]}}],"version":"2.0"}}"#,
        ),
        digest = DIGEST,
        pk = PUB,
    );
    assert_eq!(canonical_string(&strip_fulfillments(&tx)).unwrap(), expected);

    let signer = Signer::default();
    assert_eq!(
        hex::encode(signer.pre_fulfillment_digest(&tx).unwrap()),
        "fdba92e5765e20b3c5f548cc6c3ea70bc8d627feff492a480141f86c2fb8152a"
    );
    assert_eq!(
        hex::encode(Signer::new(HashAlgorithm::Sha3_256).pre_fulfillment_digest(&tx).unwrap()),
        "c5150569e1d342302a8371493d4d9d9a4a1174a864435572d7aa62a8678b8cbc"
    );
}

/// Ed25519は決定的なので、フルフィルメントはバイト単位で一致する
#[test]
fn test_sign_matches_reference_fulfillment() {
    let tx = prepared_tx(&[PUB]);
    let keys = KeyMap::from_seed(SEED).unwrap();

    let signed = Signer::new(HashAlgorithm::Sha256).sign(&tx, &keys).unwrap();
    assert_eq!(signed.inputs[0].fulfillment.as_deref(), Some(SHA256_FULFILLMENT));
    assert_eq!(signed.id(), Some(DIGEST));

    let signed = Signer::new(HashAlgorithm::Sha3_256).sign(&tx, &keys).unwrap();
    assert_eq!(signed.inputs[0].fulfillment.as_deref(), Some(SHA3_FULFILLMENT));
}

#[test]
fn test_sign_preserves_inputs_and_sets_id() {
    let other = generate_signing_key();
    let mut keys = KeyMap::new();
    keys.insert(fixed_key());
    let other_pk = keys.insert(other);

    let tx = prepared_tx(&[PUB, other_pk.as_str(), PUB]);
    let signed = Signer::default().sign(&tx, &keys).unwrap();

    assert_eq!(signed.inputs.len(), 3);
    for (before, after) in tx.inputs.iter().zip(&signed.inputs) {
        assert_eq!(before.owners_before, after.owners_before);
        assert_eq!(before.extra, after.extra);
        let fulfillment = after.fulfillment.as_deref().unwrap();
        assert!(!fulfillment.contains('+') && !fulfillment.contains('/'));
    }
    // 同じ鍵・同じダイジェストの入力は同じフルフィルメントになる
    assert_eq!(signed.inputs[0].fulfillment, signed.inputs[2].fulfillment);
    assert_ne!(signed.inputs[0].fulfillment, signed.inputs[1].fulfillment);

    assert_eq!(signed.id(), Some(tx.document_digest()));
    assert!(signed.is_fully_signed());
    assert_eq!(signed.extra, tx.extra);
}

/// `id` が欠落していても署名後は文書ダイジェストになる
#[test]
fn test_sign_sets_id_when_absent() {
    let mut tx = prepared_tx(&[PUB]);
    tx.id = None;
    let signed = Signer::default().sign(&tx, &KeyMap::from_seed(SEED).unwrap()).unwrap();
    assert_eq!(signed.id, Some(Some(DIGEST.to_string())));
}

#[test]
fn test_sign_unauthorized_signer_leaves_tx_unchanged() {
    let stranger = generate_signing_key();
    let mut keys = KeyMap::new();
    keys.insert(stranger);

    let tx = prepared_tx(&[PUB]);
    let before = tx.clone();
    let err = Signer::default().sign(&tx, &keys).unwrap_err();
    match err {
        SignError::UnauthorizedSigner { public_key } => assert_eq!(public_key, PUB),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(tx, before);
    assert!(tx.inputs[0].fulfillment.is_none());
}

/// 2番目の入力の鍵が欠けていれば、1番目にも署名しない
#[test]
fn test_sign_fails_before_signing_any_input() {
    let keys = KeyMap::from_seed(SEED).unwrap();
    let missing = generate_signing_key().verifying_key().to_bytes().to_base58();
    let tx = prepared_tx(&[PUB, missing.as_str()]);

    assert!(matches!(
        Signer::default().sign(&tx, &keys),
        Err(SignError::UnauthorizedSigner { .. })
    ));
    assert!(tx.inputs.iter().all(|input| input.fulfillment.is_none()));
}

#[test]
fn test_sign_rejects_missing_owner_and_empty_inputs() {
    let keys = KeyMap::from_seed(SEED).unwrap();

    let mut tx = prepared_tx(&[PUB]);
    tx.inputs[0].owners_before.clear();
    assert!(matches!(
        Signer::default().sign(&tx, &keys),
        Err(SignError::MissingOwner { index: 0 })
    ));

    tx.inputs.clear();
    assert!(matches!(
        Signer::default().sign(&tx, &keys),
        Err(SignError::NoInputs)
    ));
}

/// 同じprepare結果のコピーに2回署名しても署名前ダイジェストは変わらない
#[test]
fn test_digest_stable_across_repeated_signing() {
    let keys = KeyMap::from_seed(SEED).unwrap();
    let signer = Signer::default();
    let tx = prepared_tx(&[PUB]);

    let first = signer.sign(&tx.clone(), &keys).unwrap();
    let second = signer.sign(&tx.clone(), &keys).unwrap();
    assert_eq!(first, second);

    // 署名済みトランザクションからフルフィルメントを除去し id を戻すと同じダイジェスト
    let mut resigned_base = first.clone();
    resigned_base.id = tx.id.clone();
    assert_eq!(
        signer.pre_fulfillment_digest(&resigned_base).unwrap(),
        signer.pre_fulfillment_digest(&tx).unwrap()
    );
}

#[test]
fn test_verify_accepts_signed_transaction() {
    let keys = KeyMap::from_seed(SEED).unwrap();
    let tx = prepared_tx(&[PUB, PUB]);

    for hash in [HashAlgorithm::Sha256, HashAlgorithm::Sha3_256] {
        let signer = Signer::new(hash);
        let signed = signer.sign(&tx, &keys).unwrap();
        signer.verify(&signed, Some(None)).unwrap();
        signer.verify_against(&signed, &tx).unwrap();
    }
}

#[test]
fn test_verify_rejects_wrong_hash_algorithm() {
    let keys = KeyMap::from_seed(SEED).unwrap();
    let tx = prepared_tx(&[PUB]);
    let signed = Signer::new(HashAlgorithm::Sha256).sign(&tx, &keys).unwrap();

    assert!(matches!(
        Signer::new(HashAlgorithm::Sha3_256).verify(&signed, Some(None)),
        Err(SignError::SignatureMismatch { index: 0 })
    ));
    // 署名前の id が違えば署名対象も違う
    assert!(matches!(
        Signer::default().verify(&signed, None),
        Err(SignError::SignatureMismatch { index: 0 })
    ));
}

#[test]
fn test_verify_rejects_tampering() {
    let keys = KeyMap::from_seed(SEED).unwrap();
    let signer = Signer::default();
    let tx = prepared_tx(&[PUB]);
    let signed = signer.sign(&tx, &keys).unwrap();

    let mut tampered = signed.clone();
    tampered
        .asset
        .data
        .extra
        .insert("title".into(), json!("forged"));
    assert!(matches!(
        signer.verify(&tampered, Some(None)),
        Err(SignError::SignatureMismatch { .. })
    ));
    assert!(matches!(
        signer.verify_against(&tampered, &tx),
        Err(SignError::PayloadMismatch)
    ));

    let mut wrong_id = signed.clone();
    wrong_id.id = Some(Some("other".into()));
    assert!(matches!(
        signer.verify(&wrong_id, Some(None)),
        Err(SignError::IdMismatch)
    ));

    let mut garbage = signed.clone();
    garbage.inputs[0].fulfillment = Some("not-a-fulfillment".into());
    assert!(matches!(
        signer.verify(&garbage, Some(None)),
        Err(SignError::InvalidFulfillment { index: 0, .. })
    ));

    let mut unsigned = signed;
    unsigned.inputs[0].fulfillment = None;
    assert!(matches!(
        signer.verify(&unsigned, Some(None)),
        Err(SignError::InvalidFulfillment { index: 0, .. })
    ));
}

/// 別の鍵で作ったフルフィルメントは owners_before と一致しない
#[test]
fn test_verify_rejects_foreign_key() {
    let stranger = generate_signing_key();
    let mut keys = KeyMap::new();
    let stranger_pk = keys.insert(stranger);

    let signer = Signer::default();
    let mut signed = signer.sign(&prepared_tx(&[stranger_pk.as_str()]), &keys).unwrap();
    signed.inputs[0].owners_before = vec![PUB.to_string()];

    assert!(matches!(
        signer.verify(&signed, Some(None)),
        Err(SignError::UnauthorizedSigner { public_key }) if public_key == stranger_pk
    ));
}

#[test]
fn test_key_map_debug_hides_secrets() {
    let keys = KeyMap::from_seed(SEED).unwrap();
    let debug = format!("{keys:?}");
    assert!(debug.contains(PUB));
    assert!(!debug.contains(SEED));
}
