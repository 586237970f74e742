//! # フルフィルメントのバイナリエンコーディング
//!
//! 入力の `fulfillment` フィールドは、公開鍵と署名をDER風のTLVで包んだバイト列を
//! Base64url（パディングあり）にしたもの。ed25519-sha-256 crypto-condition の
//! フルフィルメント形式に一致する。
//!
//! ```text
//! A4 <len>                 SEQUENCE（context tag 4, constructed）
//!    80 <len> <公開鍵>      OCTET STRING（context tag 0）
//!    81 <len> <署名>        OCTET STRING（context tag 1）
//! ```
//!
//! ## 長さの表現
//! | 長さ | バイト列 |
//! |------|---------|
//! | < 128 | `len` |
//! | < 256 | `0x81 len` |
//! | < 65536 | `0x82 hi lo` |
//! | それ以上 | エラー |

use base64::Engine;
use der::{Decode, Header, Reader, SliceReader, Tag, TagNumber};

use crate::CodecError;

/// フルフィルメント全体を包むSEQUENCEのタグ
pub const FULFILLMENT_TAG: u8 = 0xA4;

/// 公開鍵OCTET STRINGのタグ
pub const PUBLIC_KEY_TAG: u8 = 0x80;

/// 署名OCTET STRINGのタグ
pub const SIGNATURE_TAG: u8 = 0x81;

/// エンコード可能な最大長（この値以上はエラー）
pub const MAX_ENCODED_LENGTH: usize = 65536;

/// Base64urlエンジン（パディングあり）
fn b64url() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::URL_SAFE
}

/// デコード済みのフルフィルメント。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentPayload {
    /// Ed25519公開鍵（生バイト列）
    pub public_key: Vec<u8>,
    /// Ed25519署名（生バイト列）
    pub signature: Vec<u8>,
}

/// 長さをDERの短形式・長形式でエンコードする。
pub fn encode_length(length: usize) -> Result<Vec<u8>, CodecError> {
    match length {
        0..=127 => Ok(vec![length as u8]),
        128..=255 => Ok(vec![0x81, length as u8]),
        256..=65535 => {
            let [hi, lo] = (length as u16).to_be_bytes();
            Ok(vec![0x82, hi, lo])
        }
        _ => Err(CodecError::LengthOverflow(length)),
    }
}

fn encode_octet_string(tag: u8, value: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = vec![tag];
    out.extend(encode_length(value.len())?);
    out.extend_from_slice(value);
    Ok(out)
}

fn encode_sequence(tag: u8, components: &[Vec<u8>]) -> Result<Vec<u8>, CodecError> {
    let content = components.concat();
    let mut out = vec![tag];
    out.extend(encode_length(content.len())?);
    out.extend(content);
    Ok(out)
}

/// 公開鍵と署名をフルフィルメントのバイト列にエンコードする。
///
/// どちらかが空の場合はエラー。
pub fn encode_fulfillment_payload(
    public_key: &[u8],
    signature: &[u8],
) -> Result<Vec<u8>, CodecError> {
    if public_key.is_empty() {
        return Err(CodecError::MissingField("publicKey"));
    }
    if signature.is_empty() {
        return Err(CodecError::MissingField("signature"));
    }
    let public_key = encode_octet_string(PUBLIC_KEY_TAG, public_key)?;
    let signature = encode_octet_string(SIGNATURE_TAG, signature)?;
    encode_sequence(FULFILLMENT_TAG, &[public_key, signature])
}

/// フルフィルメントのバイト列をBase64url文字列にする。
pub fn fulfillment_to_base64url(encoded: &[u8]) -> String {
    b64url().encode(encoded)
}

/// Base64url文字列からフルフィルメントのバイト列を取り出す。
pub fn fulfillment_from_base64url(fulfillment: &str) -> Result<Vec<u8>, CodecError> {
    b64url()
        .decode(fulfillment)
        .map_err(|e| CodecError::Malformed(format!("Base64urlデコードに失敗: {e}")))
}

/// フルフィルメントのバイト列をデコードする。
///
/// タグ・長さの解釈は `der` に任せる（長さは最短形式のみ受け付ける）。
pub fn decode_fulfillment_payload(bytes: &[u8]) -> Result<FulfillmentPayload, CodecError> {
    let mut reader = SliceReader::new(bytes).map_err(malformed)?;
    let content = read_tlv(&mut reader, context_tag(true, TagNumber::N4))?;
    reader.finish(()).map_err(malformed)?;

    let mut inner = SliceReader::new(content).map_err(malformed)?;
    let public_key = read_tlv(&mut inner, context_tag(false, TagNumber::N0))?.to_vec();
    let signature = read_tlv(&mut inner, context_tag(false, TagNumber::N1))?.to_vec();
    inner.finish(()).map_err(malformed)?;

    if public_key.is_empty() {
        return Err(CodecError::MissingField("publicKey"));
    }
    if signature.is_empty() {
        return Err(CodecError::MissingField("signature"));
    }
    Ok(FulfillmentPayload {
        public_key,
        signature,
    })
}

fn context_tag(constructed: bool, number: TagNumber) -> Tag {
    Tag::ContextSpecific {
        constructed,
        number,
    }
}

fn malformed(e: der::Error) -> CodecError {
    CodecError::Malformed(e.to_string())
}

/// 期待するタグのTLVを1つ読み、値部分を返す。
fn read_tlv<'a>(reader: &mut SliceReader<'a>, expected: Tag) -> Result<&'a [u8], CodecError> {
    let header = Header::decode(reader).map_err(malformed)?;
    if header.tag != expected {
        return Err(CodecError::Malformed(format!(
            "タグが一致しません: 期待 {expected}, 実際 {}",
            header.tag
        )));
    }
    reader.read_slice(header.length).map_err(malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_length_boundaries() {
        assert_eq!(encode_length(0).unwrap(), vec![0x00]);
        assert_eq!(encode_length(127).unwrap(), vec![0x7F]);
        assert_eq!(encode_length(128).unwrap(), vec![0x81, 0x80]);
        assert_eq!(encode_length(255).unwrap(), vec![0x81, 0xFF]);
        assert_eq!(encode_length(256).unwrap(), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode_length(65535).unwrap(), vec![0x82, 0xFF, 0xFF]);
        assert!(matches!(
            encode_length(65536),
            Err(CodecError::LengthOverflow(65536))
        ));
    }

    /// Ed25519の32バイト公開鍵と64バイト署名のレイアウトを確認
    #[test]
    fn test_encode_fulfillment_layout() {
        let public_key = [0x11u8; 32];
        let signature = [0x22u8; 64];
        let encoded = encode_fulfillment_payload(&public_key, &signature).unwrap();

        assert_eq!(encoded.len(), 2 + 2 + 32 + 2 + 64);
        assert_eq!(&encoded[..4], &[0xA4, 0x64, 0x80, 0x20]);
        assert_eq!(&encoded[4..36], &public_key);
        assert_eq!(&encoded[36..38], &[0x81, 0x40]);
        assert_eq!(&encoded[38..], &signature);

        let uri = fulfillment_to_base64url(&encoded);
        assert!(uri.starts_with("pGSAI"));
        assert!(!uri.contains('+') && !uri.contains('/'));
    }

    #[test]
    fn test_encode_long_form_sequence() {
        let encoded = encode_fulfillment_payload(&[1u8; 32], &[2u8; 200]).unwrap();
        // 中身: 2+32 + 3+200 = 237 → 0x81 0xED
        assert_eq!(&encoded[..2], &[0xA4, 0x81]);
        assert_eq!(encoded[2], 237);
        assert_eq!(&encoded[37..40], &[0x81, 0x81, 200]);
    }

    #[test]
    fn test_encode_rejects_empty_fields() {
        assert!(matches!(
            encode_fulfillment_payload(&[], &[1]),
            Err(CodecError::MissingField("publicKey"))
        ));
        assert!(matches!(
            encode_fulfillment_payload(&[1], &[]),
            Err(CodecError::MissingField("signature"))
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let signature = vec![0u8; 65536];
        assert!(matches!(
            encode_fulfillment_payload(&[1u8; 32], &signature),
            Err(CodecError::LengthOverflow(65536))
        ));
    }

    #[test]
    fn test_decode_fulfillment() {
        let encoded = encode_fulfillment_payload(&[7u8; 32], &[9u8; 300]).unwrap();
        let uri = fulfillment_to_base64url(&encoded);
        let decoded = decode_fulfillment_payload(&fulfillment_from_base64url(&uri).unwrap()).unwrap();
        assert_eq!(decoded.public_key, vec![7u8; 32]);
        assert_eq!(decoded.signature, vec![9u8; 300]);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let good = encode_fulfillment_payload(&[7u8; 32], &[9u8; 64]).unwrap();

        let mut wrong_tag = good.clone();
        wrong_tag[0] = 0xA5;
        assert!(matches!(
            decode_fulfillment_payload(&wrong_tag),
            Err(CodecError::Malformed(_))
        ));

        let truncated = &good[..good.len() - 1];
        assert!(decode_fulfillment_payload(truncated).is_err());

        let mut trailing = good.clone();
        trailing.push(0);
        assert!(decode_fulfillment_payload(&trailing).is_err());

        // 最短形式でない長さ表現
        let non_minimal = [0xA4, 0x81, 0x04, 0x80, 0x01, 0x01, 0x81, 0x00];
        assert!(decode_fulfillment_payload(&non_minimal).is_err());

        assert!(fulfillment_from_base64url("pGS+").is_err());
    }

    /// 不定長・冗長な長形式・データ長を超える長さを拒否することを確認
    #[test]
    fn test_decode_rejects_non_der_lengths() {
        let cases: [&[u8]; 4] = [
            // 不定長
            &[0xA4, 0x80, 0x80, 0x01, 0x01, 0x81, 0x01, 0x02, 0x00, 0x00],
            // 0x82 で 6 を表す
            &[0xA4, 0x82, 0x00, 0x06, 0x80, 0x01, 0x01, 0x81, 0x01, 0x02],
            // 内側の長さが外側を超える
            &[0xA4, 0x06, 0x80, 0x05, 0x01, 0x81, 0x01, 0x02],
            // 公開鍵と署名の順序が逆
            &[0xA4, 0x06, 0x81, 0x01, 0x02, 0x80, 0x01, 0x01],
        ];
        for bytes in cases {
            assert!(
                matches!(decode_fulfillment_payload(bytes), Err(CodecError::Malformed(_))),
                "{bytes:02x?}"
            );
        }

        let minimal = [0xA4, 0x06, 0x80, 0x01, 0x01, 0x81, 0x01, 0x02];
        let decoded = decode_fulfillment_payload(&minimal).unwrap();
        assert_eq!(decoded.public_key, vec![0x01]);
        assert_eq!(decoded.signature, vec![0x02]);
    }
}
