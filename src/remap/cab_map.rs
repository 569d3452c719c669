use std::collections::HashMap;

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, BuildError, MatchKind};

/// Maps old container ids to new ones and substitutes them inside arbitrary
/// strings.
///
/// Keys are matched ASCII case-insensitively. When several keys match at the
/// same position, the longest one wins, so `cab-10` is never shadowed by
/// `cab-1`.
#[derive(Debug, Clone)]
pub struct CabMap {
    /// Folded key to index into `replacements`.
    keys: HashMap<String, usize>,

    /// Indexed by the matcher's pattern id.
    replacements: Vec<String>,

    matcher: Option<AhoCorasick>,
}

impl CabMap {
    /// Builds a map from `(old, new)` pairs. The first pair seen for a key
    /// wins; later pairs with the same key, in any casing, are ignored.
    pub fn new<I, K, V>(pairs: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut keys = HashMap::new();
        let mut patterns = Vec::new();
        let mut replacements = Vec::new();

        for (old, new) in pairs {
            let old = old.as_ref();
            if old.is_empty() {
                continue;
            }

            let folded = old.to_ascii_lowercase();
            if !keys.contains_key(&folded) {
                keys.insert(folded, replacements.len());
                patterns.push(old.to_owned());
                replacements.push(new.into());
            }
        }

        let matcher = if patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasickBuilder::new()
                    .ascii_case_insensitive(true)
                    .match_kind(MatchKind::LeftmostLongest)
                    .build(&patterns)?,
            )
        };

        Ok(Self {
            keys,
            replacements,
            matcher,
        })
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        let index = *self.keys.get(&old.to_ascii_lowercase())?;
        Some(&self.replacements[index])
    }

    /// Replaces every occurrence of a known container id in `input`.
    ///
    /// Returns `None` if the result would be identical to `input`.
    pub fn substitute(&self, input: &str) -> Option<String> {
        let matcher = self.matcher.as_ref()?;

        if !matcher.is_match(input) {
            return None;
        }

        let mut output = String::with_capacity(input.len());
        matcher.replace_all_with(input, &mut output, |found, _, dst| {
            dst.push_str(&self.replacements[found.pattern().as_usize()]);
            true
        });

        if output == input {
            None
        } else {
            Some(output)
        }
    }
}
