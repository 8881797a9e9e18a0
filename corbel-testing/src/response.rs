// Response wrapper with fluent assertions

use corbel_core::HttpResponse;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Response from a test request
///
/// Assertion methods panic with a descriptive message and return `&Self`
/// so they chain.
#[derive(Debug, Clone)]
pub struct TestResponse {
    inner: HttpResponse,
}

impl TestResponse {
    pub fn new(inner: HttpResponse) -> Self {
        Self { inner }
    }

    pub fn status(&self) -> u16 {
        self.inner.status
    }

    /// Header value, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn text(&self) -> String {
        self.inner.body_string()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, corbel_core::Error> {
        self.inner.body_json()
    }

    pub fn into_inner(self) -> HttpResponse {
        self.inner
    }

    fn json_value(&self) -> Value {
        match self.inner.body_json::<Value>() {
            Ok(value) => value,
            Err(e) => panic!("Response body is not JSON ({}): {}", e, self.text()),
        }
    }

    pub fn assert_status(&self, expected: u16) -> &Self {
        assert_eq!(
            self.inner.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.inner.status,
            self.text()
        );
        self
    }

    pub fn assert_success(&self) -> &Self {
        assert!(
            (200..300).contains(&self.inner.status),
            "Expected successful status (2xx), got {}. Body: {}",
            self.inner.status,
            self.text()
        );
        self
    }

    pub fn assert_header(&self, name: &str, expected: &str) -> &Self {
        let actual = self.header(name);
        assert_eq!(
            actual,
            Some(expected),
            "Expected header '{}' to be '{}', got {:?}",
            name,
            expected,
            actual
        );
        self
    }

    pub fn assert_json(&self, expected: &Value) -> &Self {
        let actual = self.json_value();
        assert_eq!(&actual, expected, "JSON bodies do not match");
        self
    }

    /// Assert a top-level field of a JSON object body
    pub fn assert_json_field(&self, field: &str, expected: impl Into<Value>) -> &Self {
        let actual = self.json_value();
        let expected = expected.into();
        assert_eq!(
            actual.get(field),
            Some(&expected),
            "Expected field '{}' to be {}, body was {}",
            field,
            expected,
            actual
        );
        self
    }

    pub fn assert_body_contains(&self, needle: &str) -> &Self {
        let body = self.text();
        assert!(
            body.contains(needle),
            "Expected body to contain '{}'. Body: {}",
            needle,
            body
        );
        self
    }

    pub fn assert_empty_body(&self) -> &Self {
        assert!(
            self.inner.body.is_empty(),
            "Expected an empty body, got: {}",
            self.text()
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> TestResponse {
        TestResponse::new(
            HttpResponse::new(201)
                .with_json(&serde_json::json!({ "id": 7, "name": "ada" }))
                .unwrap()
                .with_header("X-Request-Id", "abc"),
        )
    }

    #[test]
    fn test_chained_assertions() {
        response()
            .assert_status(201)
            .assert_success()
            .assert_header("x-request-id", "abc")
            .assert_header("content-type", "application/json")
            .assert_json_field("id", 7)
            .assert_body_contains("ada");
    }

    #[test]
    fn test_typed_json() {
        #[derive(serde::Deserialize)]
        struct User {
            id: u32,
        }
        let user: User = response().json().unwrap();
        assert_eq!(user.id, 7);
    }

    #[test]
    #[should_panic(expected = "Expected status 200, got 201")]
    fn test_status_mismatch_panics() {
        response().assert_status(200);
    }

    #[test]
    fn test_empty_body() {
        TestResponse::new(HttpResponse::no_content())
            .assert_status(204)
            .assert_empty_body();
    }
}
