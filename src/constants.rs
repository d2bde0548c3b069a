// constants file
pub const APP_NAME: &str = "bash-whisperer";

pub const PROMPT_PREAMBLE: &str = "Convert natural language to bash commands. Examples:";
pub const QUERY_MARKER: &str = "Query:";
pub const COMMAND_MARKER: &str = "Command:";

/// Returned in place of a command whenever nothing usable could be extracted.
/// Running it only prints a notice.
pub const FALLBACK_COMMAND: &str = "echo 'Could not generate a valid command'";

pub const DEFAULT_EXAMPLES: &[(&str, &str)] = &[
    ("list files by size", "ls -lhS"),
    ("show disk usage", "du -h"),
    ("find large files", "find . -type f -size +100M"),
    ("show system memory", "free -h"),
    ("show directory structure", "tree"),
];

pub const QUERY_PROMPT: &str = "\nEnter your query (or 'exit' to quit): ";
pub const CONFIRM_PROMPT: &str = "Execute this command? (y/n): ";

pub const DEFAULT_BEDROCK_MODEL_ID: &str = "anthropic.claude-3-haiku-20240307-v1:0";

pub const SYSTEM_PROMPT: &str = "You complete few-shot prompts that convert natural language into bash commands.

The user message lists example pairs of the form:
Query: <request>
Command: <bash command>

It ends with a final Query followed by an empty Command: line.

Reply with ONLY the bash command for the final query, on a single line:
- no explanation, no markdown, no code fences
- do not repeat the Query or Command labels
- do not add further examples";

pub const DEFAULT_CONFIG_CONTENT: &str = r#"# bash-whisperer configuration
#
# Every key is optional. Environment variables prefixed with BASH_WHISPERER
# override this file, e.g. BASH_WHISPERER__MODEL_CONFIG__SAMPLE_LEN=150.

# error | warn | info | debug | trace
verbosity = "warn"

# local | bedrock
ai_backend = "local"

# models_dir = "~/.bash-whisperer/models"

# shell = "sh"
# shell_flag = "-c"

[model_config]
# tinyllama | phi2 | phi3
model = "tinyllama"
cpu = false
quantized = false
# Print each prompt before it is sent. The local backend also lists the
# prompt tokens.
verbose_prompt = false
sample_len = 100
temperature = 0.8
top_p = 0.9
repeat_penalty = 1.1
repeat_last_n = 64
dtype = "f32"
stop_sequences = ["\nQuery:"]

[aws_settings]
region = "us-east-1"
# profile = "default"
# model_id = "anthropic.claude-3-haiku-20240307-v1:0"

# Replace the built-in few-shot examples. Order is kept in the prompt.
# [[examples]]
# query = "list files by size"
# command = "ls -lhS"
"#;
