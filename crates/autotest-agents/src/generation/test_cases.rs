//! Stage A: requirement text to raw test-case objects.

use autotest_engine::parse_json_array;
use serde_json::Value;

use super::{GenerationError, GenerationRequest, TextGenerator};
use crate::prompts;

/// Ask the model for test cases and repair its answer into a list of objects.
pub async fn generate_test_cases(
    generator: &dyn TextGenerator,
    model: &str,
    temperature: f64,
    requirement: &str,
) -> Result<Vec<Value>, GenerationError> {
    let request = GenerationRequest {
        model: model.to_string(),
        prompt: prompts::test_case_prompt(requirement),
        temperature,
    };
    let raw = generator.generate(request).await?;

    let cases = parse_json_array(&raw).map_err(|e| {
        tracing::warn!(error = %e, response_chars = raw.len(), "test case payload could not be repaired");
        GenerationError::Parse(e)
    })?;

    if let Some(position) = cases.iter().position(|case| !case.is_object()) {
        return Err(GenerationError::UnexpectedShape(format!(
            "element {position} is not an object"
        )));
    }

    tracing::info!(count = cases.len(), model, "test cases generated");
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::CannedGenerator;
    use serde_json::json;

    #[tokio::test]
    async fn fenced_response_with_trailing_commas_is_repaired() {
        let generator = CannedGenerator::new("```json\n[{\"id\": \"TC001\", \"steps\": [\"a\",],},]\n```");
        let cases = generate_test_cases(&generator, "m", 0.2, "login").await.unwrap();
        assert_eq!(cases, vec![json!({"id": "TC001", "steps": ["a"]})]);

        let request = generator.last_request().unwrap();
        assert_eq!(request.model, "m");
        assert!(request.prompt.contains("login"));
    }

    #[tokio::test]
    async fn prose_without_payload_is_a_parse_failure() {
        let generator = CannedGenerator::new("Sorry, I can't do that.");
        let err = generate_test_cases(&generator, "m", 0.2, "x").await.unwrap_err();
        assert!(matches!(err, GenerationError::Parse(_)), "{err}");
    }

    #[tokio::test]
    async fn non_object_elements_are_rejected() {
        let generator = CannedGenerator::new("[{\"id\": \"TC001\"}, \"TC002\"]");
        let err = generate_test_cases(&generator, "m", 0.2, "x").await.unwrap_err();
        assert!(matches!(err, GenerationError::UnexpectedShape(_)), "{err}");
    }

    #[tokio::test]
    async fn service_failure_is_passed_through() {
        let generator = CannedGenerator::failing(GenerationError::EmptyResponse);
        let err = generate_test_cases(&generator, "m", 0.2, "x").await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }
}
