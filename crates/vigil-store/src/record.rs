//! Persisted encoding record, one row of `face_encodings`.
//!
//! The vector column holds an ordered JSON list of numbers. Values are widened
//! from f32 to f64 before formatting: every f32 is exactly representable as f64
//! and f64 text round-trips exactly, so write→read returns the same bits.

use chrono::{DateTime, Utc};
use vigil_core::{Embedding, FaceEncoding, IdentityId, MalformedVector};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EncodingRecord {
    pub identity_id: String,
    pub vector: Vec<f64>,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&FaceEncoding> for EncodingRecord {
    fn from(encoding: &FaceEncoding) -> Self {
        Self {
            identity_id: encoding.identity.as_str().to_string(),
            vector: encoding.embedding.values.iter().map(|&v| f64::from(v)).collect(),
            model_version: encoding.embedding.model_version.clone(),
            created_at: encoding.created_at,
        }
    }
}

impl EncodingRecord {
    /// Rebuild a record from raw column values.
    pub fn from_columns(
        identity_id: String,
        vector_json: &str,
        model_version: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            identity_id,
            vector: serde_json::from_str(vector_json)?,
            model_version,
            created_at,
        })
    }

    /// Text of the `vector` column.
    pub fn vector_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.vector)
    }

    /// Rebuild the encoding, enforcing the store's dimension.
    pub fn into_encoding(self, dim: usize) -> Result<FaceEncoding, MalformedVector> {
        let embedding = Embedding {
            values: self.vector.iter().map(|&v| v as f32).collect(),
            model_version: self.model_version,
        };
        embedding.validate(dim)?;
        Ok(FaceEncoding {
            identity: IdentityId::from(self.identity_id),
            embedding,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn awkward_values() -> Vec<f32> {
        vec![
            0.1,
            -0.2,
            1.0 / 3.0,
            f32::MIN_POSITIVE,
            f32::MIN_POSITIVE / 8.0, // subnormal
            f32::MAX,
            -1e-30,
            0.0,
            123_456.79,
            std::f32::consts::PI,
        ]
    }

    fn reload(record: &EncodingRecord) -> EncodingRecord {
        let text = record.vector_json().unwrap();
        EncodingRecord::from_columns(
            record.identity_id.clone(),
            &text,
            record.model_version.clone(),
            record.created_at,
        )
        .unwrap()
    }

    #[test]
    fn test_vector_column_exact_roundtrip() {
        let encoding = FaceEncoding::new(
            IdentityId::from(42u64),
            Embedding { values: awkward_values(), model_version: Some("w600k_r50".into()) },
        );
        let back = reload(&EncodingRecord::from(&encoding)).into_encoding(10).unwrap();
        for (a, b) in encoding.embedding.values.iter().zip(back.embedding.values.iter()) {
            assert_eq!(a.to_bits(), b.to_bits(), "{a} came back as {b}");
        }
        assert_eq!(back, encoding);
    }

    #[test]
    fn test_record_wrong_dimension_rejected() {
        let encoding = FaceEncoding::new(IdentityId::from("a"), Embedding::new(vec![1.0, 2.0]));
        let err = EncodingRecord::from(&encoding).into_encoding(3).unwrap_err();
        assert_eq!(err, MalformedVector::WrongDimension { expected: 3, actual: 2 });
    }

    #[test]
    fn test_vector_column_must_be_a_number_list() {
        for text in ["{\"a\": 1}", "not json", "[1.0, \"x\"]", ""] {
            assert!(
                EncodingRecord::from_columns("a".into(), text, None, Utc::now()).is_err(),
                "{text:?}"
            );
        }
    }
}
