use crate::route::HostPattern;

/// Partitions route ids by how their host pattern participates in lookup,
/// so a match only has to scan the routes that could plausibly apply to a
/// given request host instead of every route in the table.
///
/// Bucket scan order is fixed and is itself part of the matching contract:
/// `exact` before `wildcard` before `any`, with `templated` folded into
/// whichever of those three its literal suffix would key it into (or
/// appended after `any` when it has none). Within a bucket, insertion order
/// is preserved — final ranking is left entirely to the table's sort.
#[derive(Debug, Clone, Default)]
pub struct HostIndex {
    exact: std::collections::HashMap<String, Vec<usize>>,
    wildcard: Vec<(String, Vec<usize>)>,
    any: Vec<usize>,
    templated: Vec<usize>,
}

impl HostIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record route at `slot` (its index into the table's route vector)
    /// under `pattern`.
    pub fn insert(&mut self, slot: usize, pattern: &HostPattern) {
        match pattern {
            HostPattern::Any => self.any.push(slot),
            HostPattern::Exact(host) => {
                self.exact.entry(host.clone()).or_default().push(slot);
            }
            HostPattern::Wildcard { suffix } => {
                match self.wildcard.iter_mut().find(|(s, _)| s == suffix) {
                    Some((_, slots)) => slots.push(slot),
                    None => self.wildcard.push((suffix.clone(), vec![slot])),
                }
            }
            HostPattern::Templated {
                literal_suffix: Some(suffix),
                ..
            } => match self.wildcard.iter_mut().find(|(s, _)| s == suffix) {
                Some((_, slots)) => slots.push(slot),
                None => self.wildcard.push((suffix.clone(), vec![slot])),
            },
            HostPattern::Templated {
                literal_suffix: None,
                ..
            } => self.templated.push(slot),
        }
    }

    /// Candidate route slots for `host`, in the order they should be tried:
    /// exact match, then every wildcard suffix that applies (longest first,
    /// so `*.api.example.com` is preferred over `*.example.com`), then the
    /// catch-all `any` bucket, then every templated route (cheap structural
    /// filtering happens here; the regex itself is checked by the matcher
    /// against the compiled cache).
    ///
    /// `host` is expected pre-normalized (port stripped, lowercased) by the
    /// caller — the matcher does this once per request rather than once per
    /// bucket lookup.
    pub fn candidates(&self, host: &str) -> Vec<usize> {
        let mut out = Vec::new();

        if let Some(slots) = self.exact.get(host) {
            out.extend_from_slice(slots);
        }

        let mut matching: Vec<&(String, Vec<usize>)> = self
            .wildcard
            .iter()
            .filter(|(suffix, _)| host.ends_with(suffix.as_str()))
            .collect();
        matching.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        for (_, slots) in matching {
            out.extend_from_slice(slots);
        }

        out.extend_from_slice(&self.any);
        out.extend_from_slice(&self.templated);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_before_wildcard_before_any() {
        let mut idx = HostIndex::new();
        idx.insert(0, &HostPattern::Any);
        idx.insert(1, &HostPattern::Wildcard { suffix: ".example.com".into() });
        idx.insert(2, &HostPattern::Exact("api.example.com".into()));
        assert_eq!(idx.candidates("api.example.com"), vec![2, 1, 0]);
    }

    #[test]
    fn longer_wildcard_suffix_wins() {
        let mut idx = HostIndex::new();
        idx.insert(0, &HostPattern::Wildcard { suffix: ".example.com".into() });
        idx.insert(1, &HostPattern::Wildcard { suffix: ".api.example.com".into() });
        assert_eq!(idx.candidates("v1.api.example.com"), vec![1, 0]);
    }

    #[test]
    fn unmatched_host_still_gets_any_and_templated() {
        let mut idx = HostIndex::new();
        idx.insert(0, &HostPattern::Any);
        idx.insert(1, &HostPattern::Templated {
            literal_suffix: None,
            regex_source: "^.*$".into(),
        });
        assert_eq!(idx.candidates("nope.example.org"), vec![0, 1]);
    }

    #[test]
    fn templated_with_literal_suffix_keys_into_wildcard_bucket() {
        let mut idx = HostIndex::new();
        idx.insert(
            0,
            &HostPattern::Templated {
                literal_suffix: Some(".example.com".into()),
                regex_source: "^[a-z]+\\.example\\.com$".into(),
            },
        );
        assert_eq!(idx.candidates("acme.example.com"), vec![0]);
        assert!(idx.candidates("acme.other.com").is_empty());
    }
}
