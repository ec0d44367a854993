//! Serde helpers for glam types.
//!
//! glam is built without its `serde` feature, so geometry routes `Vec3`
//! fields through [`vec3`] with `#[serde(with = "...")]`.

/// `Vec3` as `[x, y, z]`. Deserializing also takes `{ "x", "y", "z" }`, the
/// shape hand-written scene files tend to use.
pub mod vec3 {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Array([f32; 3]),
        Fields { x: f32, y: f32, z: f32 },
    }

    pub fn serialize<S>(v: &Vec3, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        v.to_array().serialize(s)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Vec3, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Repr::deserialize(d)? {
            Repr::Array(a) => Vec3::from_array(a),
            Repr::Fields { x, y, z } => Vec3::new(x, y, z),
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super::vec3")]
        v: Vec3,
    }

    #[test]
    fn test_vec3_writes_array() {
        let json = serde_json::to_string(&Holder { v: Vec3::new(1.0, 2.5, -3.0) }).unwrap();
        assert_eq!(json, r#"{"v":[1.0,2.5,-3.0]}"#);
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.v, Vec3::new(1.0, 2.5, -3.0));
    }

    #[test]
    fn test_vec3_reads_named_fields() {
        let back: Holder = serde_json::from_str(r#"{"v":{"x":0.5,"y":0,"z":-1}}"#).unwrap();
        assert_eq!(back.v, Vec3::new(0.5, 0.0, -1.0));
    }

    #[test]
    fn test_vec3_rejects_wrong_length() {
        assert!(serde_json::from_str::<Holder>(r#"{"v":[1.0,2.0]}"#).is_err());
    }
}
