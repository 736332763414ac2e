//! Rebalancing selector: spread the top picks across test types before
//! falling back to plain relevance order.

use assessrec_core::types::{Candidate, TestType};

#[derive(Debug, Clone)]
pub struct RebalancingSelector {
    keys: Vec<TestType>,
}

impl Default for RebalancingSelector {
    fn default() -> Self {
        Self::new(vec![TestType::Knowledge, TestType::Personality, TestType::Ability])
    }
}

impl RebalancingSelector {
    pub fn new(keys: Vec<TestType>) -> Self { Self { keys } }

    pub fn keys(&self) -> &[TestType] { &self.keys }

    /// Pick at most `top_k` candidates from a relevance-ordered list.
    ///
    /// Each declared type gets `max(top_k / active_types, 1)` slots, filled in
    /// key order; leftover slots go to the best unselected candidates. Items
    /// with no type, or a type outside the keys, count toward the first key.
    pub fn select(&self, candidates: &[Candidate], top_k: usize) -> Vec<Candidate> {
        if candidates.is_empty() || top_k == 0 {
            return Vec::new();
        }
        if self.keys.is_empty() {
            return candidates.iter().take(top_k).cloned().collect();
        }

        let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); self.keys.len()];
        for (i, c) in candidates.iter().enumerate() {
            buckets[self.bucket_of(c)].push(i);
        }
        let active = buckets.iter().filter(|b| !b.is_empty()).count();
        let per_type = (top_k / active).max(1);

        let mut taken = vec![false; candidates.len()];
        let mut picked: Vec<usize> = Vec::with_capacity(top_k);
        for bucket in &buckets {
            for &i in bucket.iter().take(per_type) {
                taken[i] = true;
                picked.push(i);
            }
        }
        if picked.len() < top_k {
            let missing = top_k - picked.len();
            picked.extend((0..candidates.len()).filter(|&i| !taken[i]).take(missing));
        }
        picked.truncate(top_k);
        picked.into_iter().map(|i| candidates[i].clone()).collect()
    }

    fn bucket_of(&self, candidate: &Candidate) -> usize {
        candidate
            .item
            .test_type
            .as_ref()
            .and_then(|t| self.keys.iter().position(|k| k == t))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessrec_core::types::CatalogItem;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn cand(name: &str, ty: Option<TestType>, score: f32) -> Candidate {
        Candidate {
            item: Arc::new(CatalogItem {
                name: name.to_string(),
                url: format!("https://example.com/{}", name),
                test_type: ty,
                source_text: name.to_string(),
            }),
            score,
        }
    }

    /// `counts` candidates per type, interleaved K,P,A,K,P,A... with strictly
    /// descending scores.
    fn interleaved(k: usize, p: usize, a: usize) -> Vec<Candidate> {
        let mut left = [(TestType::Knowledge, k), (TestType::Personality, p), (TestType::Ability, a)];
        let mut out = Vec::new();
        let mut score = 1.0f32;
        while left.iter().any(|(_, n)| *n > 0) {
            for (ty, n) in left.iter_mut() {
                if *n > 0 {
                    out.push(cand(&format!("{}{}", ty.code(), out.len()), Some(ty.clone()), score));
                    score -= 0.01;
                    *n -= 1;
                }
            }
        }
        out
    }

    fn names(v: &[Candidate]) -> Vec<String> {
        v.iter().map(|c| c.item.name.clone()).collect()
    }

    fn count(v: &[Candidate], ty: TestType) -> usize {
        v.iter().filter(|c| c.item.test_type.as_ref() == Some(&ty)).count()
    }

    #[test]
    fn scenario_a_even_split() {
        let cands = interleaved(5, 4, 3);
        assert_eq!(cands.len(), 12);
        let out = RebalancingSelector::default().select(&cands, 9);
        assert_eq!(out.len(), 9);
        assert_eq!(count(&out, TestType::Knowledge), 3);
        assert_eq!(count(&out, TestType::Personality), 3);
        assert_eq!(count(&out, TestType::Ability), 3);
        // K picks first, then P, then A, each in relevance order
        let types: Vec<&str> = out.iter().map(|c| c.item.test_type.as_ref().map(|t| t.code()).unwrap_or("")).collect();
        assert_eq!(types, vec!["K", "K", "K", "P", "P", "P", "A", "A", "A"]);
        assert!(out[..3].windows(2).all(|w| w[0].score > w[1].score));
    }

    #[test]
    fn scenario_b_single_type_takes_first_five() {
        let cands: Vec<Candidate> = (0..10).map(|i| cand(&format!("k{}", i), Some(TestType::Knowledge), 1.0 - i as f32 * 0.1)).collect();
        let out = RebalancingSelector::default().select(&cands, 5);
        assert_eq!(names(&out), names(&cands[..5]));
    }

    #[test]
    fn scenario_c_empty_input() {
        assert!(RebalancingSelector::default().select(&[], 10).is_empty());
    }

    #[test]
    fn scenario_e_small_bucket_then_backfill() {
        let mut cands: Vec<Candidate> = (0..6).map(|i| cand(&format!("k{}", i), Some(TestType::Knowledge), 0.9 - i as f32 * 0.1)).collect();
        cands.insert(2, cand("p0", Some(TestType::Personality), 0.75));
        let out = RebalancingSelector::default().select(&cands, 7);
        // per_type = 3: k0 k1 k2 then p0, then backfill k3 k4 k5
        assert_eq!(names(&out), vec!["k0", "k1", "k2", "p0", "k3", "k4", "k5"]);
    }

    #[test]
    fn zero_top_k_is_empty() {
        assert!(RebalancingSelector::default().select(&interleaved(2, 2, 2), 0).is_empty());
    }

    #[test]
    fn unknown_and_missing_types_join_first_bucket() {
        let cands = vec![
            cand("p0", Some(TestType::Personality), 0.9),
            cand("x0", Some(TestType::Simulations), 0.8),
            cand("n0", None, 0.7),
            cand("k0", Some(TestType::Knowledge), 0.6),
        ];
        // buckets: K=[x0,n0,k0], P=[p0]; per_type = 1
        let out = RebalancingSelector::default().select(&cands, 2);
        assert_eq!(names(&out), vec!["x0", "p0"]);
    }

    #[test]
    fn empty_keys_fall_back_to_relevance() {
        let cands = interleaved(3, 3, 3);
        let out = RebalancingSelector::new(Vec::new()).select(&cands, 4);
        assert_eq!(names(&out), names(&cands[..4]));
    }

    #[test]
    fn properties_hold_across_sizes() {
        let sel = RebalancingSelector::default();
        for (k, p, a) in [(5, 4, 3), (10, 0, 0), (0, 1, 9), (2, 2, 0), (1, 1, 1), (7, 3, 20)] {
            let cands = interleaved(k, p, a);
            let active = [k, p, a].iter().filter(|n| **n > 0).count();
            for top_k in 0..=cands.len() + 2 {
                let out = sel.select(&cands, top_k);
                assert_eq!(out.len(), top_k.min(cands.len()), "size for {:?} top_k={}", (k, p, a), top_k);
                let unique: HashSet<&str> = out.iter().map(|c| c.item.url.as_str()).collect();
                assert_eq!(unique.len(), out.len(), "duplicates for {:?} top_k={}", (k, p, a), top_k);
                if cands.len() >= top_k {
                    let types: HashSet<String> = out.iter().filter_map(|c| c.item.test_type.as_ref().map(|t| t.code().to_string())).collect();
                    assert!(types.len() >= active.min(top_k), "diversity for {:?} top_k={}", (k, p, a), top_k);
                }
            }
        }
    }
}
