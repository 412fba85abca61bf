//! Word vocabulary with reserved padding and unknown ids.

use std::collections::HashMap;

/// Id of the padding token.
pub const PAD_ID: u32 = 0;
/// Id of out-of-vocabulary tokens.
pub const UNK_ID: u32 = 1;

const PAD_TOKEN: &str = "<pad>";
const UNK_TOKEN: &str = "<unk>";

/// Token to id mapping. Ids after the two sentinels follow first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: Vec<String>,
}

impl Vocabulary {
    /// Build from tokenized sentences. Callers pass train and test together
    /// so that every test-time token has an id.
    pub fn build<'a, I, S>(sentences: I) -> Self
    where
        I: IntoIterator<Item = &'a S>,
        S: AsRef<[String]> + ?Sized + 'a,
    {
        let mut vocab = Self {
            token_to_id: HashMap::new(),
            id_to_token: vec![PAD_TOKEN.to_string(), UNK_TOKEN.to_string()],
        };

        for sentence in sentences {
            for token in sentence.as_ref() {
                if !vocab.token_to_id.contains_key(token) {
                    let id = vocab.id_to_token.len() as u32;
                    vocab.token_to_id.insert(token.clone(), id);
                    vocab.id_to_token.push(token.clone());
                }
            }
        }

        vocab
    }

    /// Id of a known token.
    pub fn get(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Id of a token, [`UNK_ID`] if unknown.
    pub fn id(&self, token: &str) -> u32 {
        self.get(token).unwrap_or(UNK_ID)
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(String::as_str)
    }

    /// Size including the two sentinels.
    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    /// True when no real token has been added.
    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    /// Real tokens with their ids, in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.id_to_token
            .iter()
            .enumerate()
            .skip(2)
            .map(|(id, t)| (id as u32, t.as_str()))
    }
}
