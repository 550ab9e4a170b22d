use serde::de::DeserializeOwned;

/// A JSON decode failure with the path of the offending field.
#[derive(Debug)]
pub(crate) struct JsonPathError {
    pub path: String,
    pub source: serde_json::Error,
}

impl JsonPathError {
    /// `" at <path>"`, or empty when the error is at the document root.
    pub fn location(&self) -> String {
        if self.path.is_empty() || self.path == "." {
            String::new()
        } else {
            format!(" at {}", self.path)
        }
    }
}

pub(crate) fn parse_with_path<T: DeserializeOwned>(raw: &str) -> Result<T, JsonPathError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        JsonPathError {
            path,
            source: error.into_inner(),
        }
    })
}
