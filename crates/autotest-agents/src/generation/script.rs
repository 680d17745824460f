//! Stage B: normalized records plus page markup to an executable script.

use autotest_engine::{extract_script_block, Record};

use super::{GenerationError, GenerationRequest, TextGenerator};
use crate::prompts;

/// Inputs for one script generation.
#[derive(Debug, Clone, Copy)]
pub struct ScriptInputs<'a> {
    pub records: &'a [Record],
    pub url: &'a str,
    pub html_excerpt: &'a str,
}

/// Ask the model for a script and pull the code block out of its answer.
pub async fn generate_script(
    generator: &dyn TextGenerator,
    model: &str,
    temperature: f64,
    inputs: ScriptInputs<'_>,
) -> Result<String, GenerationError> {
    let test_cases_json = serde_json::to_string_pretty(inputs.records)?;
    let request = GenerationRequest {
        model: model.to_string(),
        prompt: prompts::script_prompt(&test_cases_json, inputs.url, inputs.html_excerpt),
        temperature,
    };
    let raw = generator.generate(request).await?;

    let Some(script) = extract_script_block(&raw) else {
        tracing::warn!(response_chars = raw.len(), "no code block in script response");
        return Err(GenerationError::NoScript);
    };

    tracing::info!(
        model,
        records = inputs.records.len(),
        script_lines = script.lines().count(),
        "script generated"
    );
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::testing::CannedGenerator;
    use autotest_engine::normalize;
    use serde_json::json;

    fn records() -> Vec<Record> {
        normalize(&[json!({"id": "TC001", "description": "Login", "steps_edit": "open\nsubmit"})])
    }

    #[tokio::test]
    async fn python_block_is_extracted_and_prompt_carries_inputs() {
        let generator =
            CannedGenerator::new("Here it is:\n```python\nimport sys\nprint('hi')\n```\nEnjoy.");
        let records = records();
        let script = generate_script(
            &generator,
            "pro",
            0.2,
            ScriptInputs {
                records: &records,
                url: "https://example.test",
                html_excerpt: "<input id=\"email\">",
            },
        )
        .await
        .unwrap();
        assert_eq!(script, "import sys\nprint('hi')");

        let prompt = generator.last_request().unwrap().prompt;
        assert!(prompt.contains("\"id\": \"TC001\""));
        assert!(prompt.contains("\"steps\": [\n"));
        assert!(prompt.contains("https://example.test"));
        assert!(prompt.contains("<input id=\"email\">"));
        assert!(!prompt.contains("steps_edit"));
    }

    #[tokio::test]
    async fn response_without_code_is_rejected() {
        let generator = CannedGenerator::new("I cannot write that script.");
        let records = records();
        let err = generate_script(
            &generator,
            "pro",
            0.2,
            ScriptInputs {
                records: &records,
                url: "u",
                html_excerpt: "",
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GenerationError::NoScript));
    }
}
