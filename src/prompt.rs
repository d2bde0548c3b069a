use crate::constants::{COMMAND_MARKER, PROMPT_PREAMBLE, QUERY_MARKER};
use crate::example_bank::ExampleBank;

/// Builds the few-shot prompt for `query`.
///
/// The examples are laid out in bank order as `Query:`/`Command:` line pairs
/// separated by blank lines, and the prompt ends with the user's query and a
/// bare `Command:` marker for the model to continue. The query is inserted
/// verbatim.
pub fn build_prompt(bank: &ExampleBank, query: &str) -> String {
    let mut prompt = format!("{PROMPT_PREAMBLE}\n\n");
    for example in bank.iter() {
        prompt.push_str(&format!(
            "{QUERY_MARKER} {}\n{COMMAND_MARKER} {}\n\n",
            example.query, example.command
        ));
    }
    prompt.push_str(&format!("{QUERY_MARKER} {query}\n{COMMAND_MARKER}"));
    prompt
}
