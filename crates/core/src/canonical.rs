//! # トランザクションの正規化
//!
//! 署名対象のバイト列を決定的に構築する。全てのオブジェクトのキーを再帰的にソートし、
//! 空白なしのJSONとして直列化する。配列は要素ごとに再帰するだけで、要素の順序は保持する。
//!
//! ## キー順序
//! サーバー側の検証はECMAScriptの `JSON.stringify` と同じ出力を前提とする。
//! 1. 配列インデックスとして解釈できるキー（`"0"`〜`"4294967294"`、先頭ゼロなし）を数値の昇順
//! 2. それ以外のキーをUTF-16コード単位の辞書順
//!
//! ## 数値表現
//! 倍精度で正確に表せない整数（`|n| > 2^53 - 1`）は倍精度に丸めてから出力する。
//! 整数値の浮動小数点は小数部なしで出力し、`|x| >= 1e21` または `|x| < 1e-6` は指数表記
//! （`1e+21`, `1.5e-7`）とする。

use serde::Serialize;

use residentity_types::{Input, Transaction};

use crate::CodecError;

/// 正規化対象の値。JSONの値をオブジェクト・配列・スカラーの3種に閉じて表現する。
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    /// キーでソート済みのオブジェクト
    Object(Vec<(String, CanonicalValue)>),
    /// 順序を保持した配列
    Array(Vec<CanonicalValue>),
    /// スカラー値
    Scalar(Scalar),
}

/// JSONのスカラー値。
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl From<serde_json::Value> for CanonicalValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => {
                let mut entries: Vec<(String, CanonicalValue)> = map
                    .into_iter()
                    .map(|(key, value)| (key, CanonicalValue::from(value)))
                    .collect();
                entries.sort_by(|(a, _), (b, _)| compare_keys(a, b));
                CanonicalValue::Object(entries)
            }
            serde_json::Value::Array(items) => {
                CanonicalValue::Array(items.into_iter().map(CanonicalValue::from).collect())
            }
            serde_json::Value::Null => CanonicalValue::Scalar(Scalar::Null),
            serde_json::Value::Bool(b) => CanonicalValue::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => CanonicalValue::Scalar(Scalar::Number(n)),
            serde_json::Value::String(s) => CanonicalValue::Scalar(Scalar::String(s)),
        }
    }
}

impl CanonicalValue {
    /// 任意のシリアライズ可能な値から構築する。
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, CodecError> {
        let json = serde_json::to_value(value)
            .map_err(|e| CodecError::Encoding(format!("JSON値への変換に失敗: {e}")))?;
        Ok(CanonicalValue::from(json))
    }

    /// 空白なしのJSON文字列として書き出す。
    pub fn write_json(&self, out: &mut String) -> Result<(), CodecError> {
        match self {
            CanonicalValue::Object(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_string(key, out)?;
                    out.push(':');
                    value.write_json(out)?;
                }
                out.push('}');
            }
            CanonicalValue::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_json(out)?;
                }
                out.push(']');
            }
            CanonicalValue::Scalar(Scalar::Null) => out.push_str("null"),
            CanonicalValue::Scalar(Scalar::Bool(b)) => out.push_str(if *b { "true" } else { "false" }),
            CanonicalValue::Scalar(Scalar::Number(n)) => write_number(n, out)?,
            CanonicalValue::Scalar(Scalar::String(s)) => write_string(s, out)?,
        }
        Ok(())
    }

    /// 正規化済みJSON文字列。
    pub fn to_json_string(&self) -> Result<String, CodecError> {
        let mut out = String::new();
        self.write_json(&mut out)?;
        Ok(out)
    }
}

/// 値を正規化し、UTF-8バイト列を返す。
///
/// キーの挿入順のみが異なる構造的に等しい値は、同一のバイト列になる。
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(canonical_string(value)?.into_bytes())
}

/// 値を正規化し、JSON文字列を返す。
pub fn canonical_string<T: Serialize>(value: &T) -> Result<String, CodecError> {
    CanonicalValue::from_serialize(value)?.to_json_string()
}

/// 全入力の `fulfillment` を `null` にしたコピーを返す。
///
/// 署名対象は計算中のフルフィルメント自身を含んではならない。
pub fn strip_fulfillments(tx: &Transaction) -> Transaction {
    Transaction {
        inputs: tx
            .inputs
            .iter()
            .map(|input| Input {
                fulfillment: None,
                ..input.clone()
            })
            .collect(),
        ..tx.clone()
    }
}

/// 配列インデックスとして扱われるキーなら、その数値を返す。
fn array_index(key: &str) -> Option<u32> {
    if key.is_empty() || key.len() > 10 || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    let n: u64 = key.parse().ok()?;
    if n < u64::from(u32::MAX) {
        Some(n as u32)
    } else {
        None
    }
}

fn compare_keys(a: &str, b: &str) -> std::cmp::Ordering {
    match (array_index(a), array_index(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.encode_utf16().cmp(b.encode_utf16()),
    }
}

fn write_string(s: &str, out: &mut String) -> Result<(), CodecError> {
    let quoted = serde_json::to_string(s)
        .map_err(|e| CodecError::Encoding(format!("文字列のエスケープに失敗: {e}")))?;
    out.push_str(&quoted);
    Ok(())
}

/// 倍精度浮動小数点で正確に表せる整数の上限（`Number.MAX_SAFE_INTEGER`）
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

fn write_number(n: &serde_json::Number, out: &mut String) -> Result<(), CodecError> {
    if let Some(i) = n.as_i64().filter(|i| i.unsigned_abs() <= MAX_SAFE_INTEGER) {
        out.push_str(&i.to_string());
        return Ok(());
    }
    if let Some(u) = n.as_u64().filter(|u| *u <= MAX_SAFE_INTEGER) {
        out.push_str(&u.to_string());
        return Ok(());
    }
    // 範囲外の整数は倍精度に丸めてから書き出す
    let x = n
        .as_f64()
        .filter(|x| x.is_finite())
        .ok_or_else(|| CodecError::Encoding(format!("数値を表現できません: {n}")))?;
    out.push_str(&format_f64(x));
    Ok(())
}

fn format_f64(x: f64) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    let abs = x.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{x}");
    }
    let exp = format!("{x:e}");
    match exp.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => exp,
    }
}
