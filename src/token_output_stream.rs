use candle_core::Result;

/// Wraps a tokenizer so generated tokens can be turned into text one piece at
/// a time instead of decoding the whole sequence at the end.
///
/// Tokens are buffered until they decode to text ending in an alphanumeric
/// character, which keeps multi-byte characters and merged pieces intact.
pub struct TokenOutputStream {
    tokenizer: tokenizers::Tokenizer,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl TokenOutputStream {
    pub fn new(tokenizer: tokenizers::Tokenizer) -> Self {
        Self {
            tokenizer,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        match self.tokenizer.decode(tokens, true) {
            Ok(str) => Ok(str),
            Err(err) => candle_core::bail!("cannot decode: {err}"),
        }
    }

    fn decoded_so_far(&self) -> Result<String> {
        if self.tokens.is_empty() {
            Ok(String::new())
        } else {
            self.decode(&self.tokens[self.prev_index..self.current_index])
        }
    }

    /// Feeds one token. Returns the newly completed text, if any.
    // https://github.com/huggingface/text-generation-inference/blob/5ba53d44a18983a4de32d122f4cb46f4a17d9ef6/server/text_generation_server/models/model.py#L68
    pub fn next_token(&mut self, token: u32) -> Result<Option<String>> {
        let prev_text = self.decoded_so_far()?;
        self.tokens.push(token);
        let text = self.decode(&self.tokens[self.prev_index..])?;
        let completes_word = text.chars().last().is_some_and(char::is_alphanumeric);
        if text.len() > prev_text.len() && completes_word {
            let text = text.split_at(prev_text.len());
            self.prev_index = self.current_index;
            self.current_index = self.tokens.len();
            Ok(Some(text.1.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Decodes whatever is still buffered.
    pub fn decode_rest(&self) -> Result<Option<String>> {
        let prev_text = self.decoded_so_far()?;
        let text = self.decode(&self.tokens[self.prev_index..])?;
        if text.len() > prev_text.len() {
            let text = text.split_at(prev_text.len());
            Ok(Some(text.1.to_string()))
        } else {
            Ok(None)
        }
    }

    pub fn get_token(&self, token_s: &str) -> Option<u32> {
        self.tokenizer.get_vocab(true).get(token_s).copied()
    }

    pub fn tokenizer(&self) -> &tokenizers::Tokenizer {
        &self.tokenizer
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
        self.prev_index = 0;
        self.current_index = 0;
    }
}
