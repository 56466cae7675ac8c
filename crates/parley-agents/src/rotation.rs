use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parley_common::{Error, Result};

use crate::providers::LlmProvider;

/// One usable (API key, model) pair.
pub struct Credential {
    /// Position across all tiers, primary tier first.
    pub index: usize,
    pub tier: usize,
    pub key: usize,
    pub label: String,
    pub provider: Arc<dyn LlmProvider>,
}

/// Credentials grouped into model tiers, each tier holding one credential per
/// API key.
///
/// A single cursor over keys is shared by all concurrent requests and advances
/// on every acquisition. A request walks every key of the primary tier before
/// it reaches the next tier, so fallback models only serve traffic the
/// primary tier could not.
pub struct CredentialRotator {
    tiers: Vec<Vec<Credential>>,
    keys: usize,
    cursor: AtomicUsize,
}

impl CredentialRotator {
    /// A single tier.
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Result<Self> {
        Self::with_tiers(vec![providers])
    }

    /// Tiers in priority order. Empty tiers are skipped.
    pub fn with_tiers(tiers: Vec<Vec<Arc<dyn LlmProvider>>>) -> Result<Self> {
        let mut index = 0;
        let tiers: Vec<Vec<Credential>> = tiers
            .into_iter()
            .filter(|providers| !providers.is_empty())
            .enumerate()
            .map(|(tier, providers)| {
                providers
                    .into_iter()
                    .enumerate()
                    .map(|(key, provider)| {
                        let credential = Credential {
                            index,
                            tier,
                            key,
                            label: provider.provider_id().to_string(),
                            provider,
                        };
                        index += 1;
                        credential
                    })
                    .collect()
            })
            .collect();

        let keys = tiers.iter().map(Vec::len).max().unwrap_or(0);
        if keys == 0 {
            return Err(Error::Config("no Gemini credentials configured".into()));
        }
        Ok(Self {
            tiers,
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Return the key at the cursor and advance the cursor.
    fn advance(&self) -> usize {
        let keys = self.keys;
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % keys))
        {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Attempt order for one request: `len()` credentials, tier by tier.
    pub fn attempts(&self) -> Attempts<'_> {
        Attempts {
            rotator: self,
            tier: 0,
            taken: 0,
        }
    }

    /// Total number of credentials across tiers.
    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    pub fn credentials(&self) -> impl Iterator<Item = &Credential> {
        self.tiers.iter().flatten()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.credentials().map(|c| c.label.as_str()).collect()
    }
}

/// Iterator returned by [`CredentialRotator::attempts`]. Each item advances
/// the shared cursor and yields the cursor's key on the current tier.
pub struct Attempts<'a> {
    rotator: &'a CredentialRotator,
    tier: usize,
    taken: usize,
}

impl<'a> Iterator for Attempts<'a> {
    type Item = &'a Credential;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let credentials = self.rotator.tiers.get(self.tier)?;
            if self.taken < credentials.len() {
                self.taken += 1;
                let key = self.rotator.advance();
                return Some(&credentials[key % credentials.len()]);
            }
            self.tier += 1;
            self.taken = 0;
        }
    }
}
