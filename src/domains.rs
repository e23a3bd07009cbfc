use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Return the pool of popular domains probes are sampled from.
///
/// These are high-traffic names that any public resolver answers; they
/// keep the measurement about resolver responsiveness rather than
/// upstream authoritative latency.
pub fn default_domains() -> Vec<String> {
	vec![
		"google.com", "youtube.com", "facebook.com", "amazon.com", "wikipedia.org",
		"reddit.com", "github.com", "stackoverflow.com", "netflix.com", "apple.com",
		"microsoft.com", "twitter.com", "instagram.com", "linkedin.com", "ebay.com",
		"nytimes.com", "cnn.com", "vercel.com", "spotify.com", "dropbox.com",
		"cloudflare.com",
	].into_iter().map(String::from).collect()
}

/// Sample `count` distinct domains from the default pool.
///
/// A seed makes the selection reproducible across runs. The count is
/// clamped to the pool size and to at least 1.
pub fn pick_domains(count: usize, seed: Option<u64>) -> Vec<String> {
	let pool = default_domains();
	let count = count.clamp(1, pool.len());
	let mut rng = match seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_entropy(),
	};
	pool.choose_multiple(&mut rng, count).cloned().collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_pool_size() {
		assert_eq!(default_domains().len(), 21);
	}

	#[test]
	fn test_pick_is_seeded_and_reproducible() {
		let a = pick_domains(5, Some(42));
		let b = pick_domains(5, Some(42));
		assert_eq!(a, b);
		assert_eq!(a.len(), 5);
	}

	#[test]
	fn test_pick_distinct() {
		let picked = pick_domains(10, Some(7));
		let mut deduped = picked.clone();
		deduped.sort();
		deduped.dedup();
		assert_eq!(deduped.len(), picked.len());
	}

	#[test]
	fn test_pick_clamps_count() {
		assert_eq!(pick_domains(0, Some(1)).len(), 1);
		assert_eq!(pick_domains(500, Some(1)).len(), default_domains().len());
	}
}
