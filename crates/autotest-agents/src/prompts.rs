//! Instruction builders for the two generation stages.
//!
//! The wording is free to change; the output contracts are not. Stage A must
//! ask for a bare JSON array of test-case objects, Stage B for one fenced
//! Python script that prints the outcome records the report parser reads.

/// Prompt version. Bump on any instruction change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Stage A: requirement text to a JSON array of test cases.
pub fn test_case_prompt(requirement: &str) -> String {
    format!(
        "\
You are an expert software quality assurance engineer. Based on the software \
requirement below, produce a comprehensive list of test cases as JSON ONLY.

Software requirement:
\"\"\"
{requirement}
\"\"\"

Instructions:
1. Cover positive scenarios, negative scenarios, edge cases and boundary conditions.
2. The output MUST be one valid JSON array; each element is one test case object.
3. Every object MUST have these fields:
   - \"id\": unique test case id, e.g. \"TC001\".
   - \"description\": short summary of the test objective.
   - \"preconditions\": list of strings describing the required starting state (or []).
   - \"test_type\": category, e.g. \"Functional\", \"UI\", \"Negative\".
   - \"steps\": list of strings, one concrete action per step \
(e.g. \"Enter 'user@test.com' into the username field\").
   - \"expected_outcome\": for positive tests, the successful result. For negative \
tests, the nature of the expected error rather than its exact wording, e.g. \
\"An error message indicating invalid credentials should be displayed.\" If specific \
keywords are expected, name them: \"Error message containing 'invalid' or 'incorrect'.\"
4. No explanations, summaries or any text outside the JSON array. Start with `[` and end with `]`.
5. Use double quotes for every string, separate array items with commas, write empty arrays as [].

Generate the JSON output now:
"
    )
}

/// Stage B: normalized test cases plus page markup to a Selenium script.
pub fn script_prompt(test_cases_json: &str, url: &str, html_excerpt: &str) -> String {
    format!(
        "\
You are an expert Python test automation engineer specialising in Selenium WebDriver. \
Write one complete Python script that automates the test cases below against the web \
application at the target URL. The script MUST report every test case on stdout in the \
structured format given here.

Target URL: {url}

Test cases (JSON):
```json
{test_cases_json}
```

HTML excerpt from the target URL's initial load, for selector guidance:
```html
{html_excerpt}
... (HTML may be truncated) ...
```

Required stdout format for each test case, exactly:
```
TEST_RESULT_START
ID: <test case id>
DESCRIPTION: <test case description>
STATUS: <PASS|FAIL|ERROR>
MESSAGE: <concise detail>
TEST_RESULT_END
```
- STATUS: PASS when every assertion holds.
- STATUS: FAIL when an assertion fails or an expected negative outcome is not met.
- STATUS: ERROR when an unexpected exception (e.g. NoSuchElementException) stops the test.

Script requirements:
1. Do not embed the JSON above as data; implement each test case as its own function, \
e.g. `def test_TC001(driver):`.
2. Imports: selenium, time, argparse, sys, traceback, webdriver_manager.chrome, \
WebDriverWait, expected_conditions as EC, By, selenium.common.exceptions.
3. The `if __name__ == \"__main__\":` block parses a `--headless` flag with argparse, sets \
up Chrome through ChromeDriverManager, and calls every test function inside its own \
try/except. An unexpected exception prints an ERROR record for that test and its \
traceback to stderr with `traceback.print_exc(file=sys.stderr)`.
4. Count passed, failed and errored tests and finish with exactly one stdout line: \
`EXECUTION SUMMARY: Passed: X, Failed: Y, Errored: Z`. Call `driver.quit()` in a finally block.
5. Each test navigates to {url} first, uses WebDriverWait with 10-15 second timeouts, \
prefers By.ID, By.NAME, By.CSS_SELECTOR or By.XPATH selectors found in the excerpt, and \
always prints TEST_RESULT_END, including after a FAIL. Catch AssertionError inside the \
test and report FAIL; let other exceptions reach the main block.
6. Output ONLY the Python code inside one ```python fenced block, with no text outside it.

Generate the Python script now:
"
    )
}
