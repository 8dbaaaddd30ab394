//! Deterministic photo/video pairing.
//!
//! Groups unlinked still images with their companion videos using the
//! filename key from [`base_key`] and a creation-time tolerance. Lookup is
//! hash-indexed by key, so a listing of tens of thousands of assets is paired
//! in a single pass over photos.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::core::filename::base_key;
use crate::core::types::{Asset, CandidatePair, MediaKind};

/// Default creation-time window between a photo and its companion video.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(3);

/// Output of [`pair_assets`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pairing {
    /// Candidate pairs, in photo listing order.
    pub pairs: Vec<CandidatePair>,
    /// Unlinked photos with no partner inside the tolerance window.
    pub unmatched_photos: Vec<Asset>,
    /// Videos not claimed by any photo (existing link or new candidate).
    pub unmatched_videos: Vec<Asset>,
}

/// Pair unlinked photos with videos.
///
/// - Images that already carry a live-photo link are skipped, and the video
///   they point to is never offered to another photo.
/// - Among videos sharing the photo's key and within `tolerance`, the one with
///   the smallest absolute time delta wins; exact ties go to the video listed
///   first. Photos are served in listing order, and a chosen video is
///   unavailable to later photos.
/// - Assets repeated in the listing are considered once.
///
/// The result is reproducible for a given input order, not guaranteed correct.
pub fn pair_assets(assets: &[Asset], tolerance: Duration) -> Pairing {
    let tolerance_ms = i64::try_from(tolerance.as_millis()).unwrap_or(i64::MAX);

    let mut claimed: HashSet<&str> = HashSet::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut photos: Vec<&Asset> = Vec::new();
    let mut videos: Vec<&Asset> = Vec::new();

    for asset in assets {
        if !seen.insert(asset.id.as_str()) {
            continue;
        }
        match asset.kind {
            MediaKind::Image => match asset.live_photo_video_id.as_deref() {
                Some(video_id) if asset.is_linked() => {
                    claimed.insert(video_id);
                }
                _ => photos.push(asset),
            },
            MediaKind::Video => videos.push(asset),
            MediaKind::Audio | MediaKind::Other => {}
        }
    }

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, video) in videos.iter().enumerate() {
        if claimed.contains(video.id.as_str()) {
            continue;
        }
        index
            .entry(base_key(&video.original_file_name))
            .or_default()
            .push(idx);
    }

    let mut taken = vec![false; videos.len()];
    let mut pairing = Pairing::default();

    for photo in photos {
        let Some(bucket) = index.get(&base_key(&photo.original_file_name)) else {
            pairing.unmatched_photos.push(photo.clone());
            continue;
        };

        let mut best: Option<(usize, i64)> = None;
        for &idx in bucket {
            if taken[idx] || videos[idx].id == photo.id {
                continue;
            }
            let delta = (photo.file_created_at - videos[idx].file_created_at)
                .num_milliseconds()
                .abs();
            if delta > tolerance_ms {
                continue;
            }
            // Strict `<` keeps the first-listed video on exact ties.
            if best.is_none_or(|(_, best_delta)| delta < best_delta) {
                best = Some((idx, delta));
            }
        }

        match best {
            Some((idx, _)) => {
                taken[idx] = true;
                pairing
                    .pairs
                    .push(CandidatePair::from_assets(photo, videos[idx]));
            }
            None => pairing.unmatched_photos.push(photo.clone()),
        }
    }

    pairing.unmatched_videos = videos
        .iter()
        .enumerate()
        .filter(|(idx, video)| !taken[*idx] && !claimed.contains(video.id.as_str()))
        .map(|(_, video)| (*video).clone())
        .collect();

    pairing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{linked_photo, photo, video};

    fn ids(pairing: &Pairing) -> Vec<(&str, &str)> {
        pairing
            .pairs
            .iter()
            .map(|p| (p.photo_asset_id.as_str(), p.video_asset_id.as_str()))
            .collect()
    }

    #[test]
    fn pairs_heic_with_suffixed_mov_inside_window() {
        let assets = vec![
            photo("p1", "A.heic", "2022-06-03T21:02:35.193Z"),
            video("v1", "A_3.mov", "2022-06-03T21:02:34.000Z"),
        ];
        let pairing = pair_assets(&assets, Duration::from_secs(2));
        assert_eq!(ids(&pairing), vec![("p1", "v1")]);
        assert_eq!(pairing.pairs[0].photo_filename, "A.heic");
        assert_eq!(pairing.pairs[0].video_filename, "A_3.mov");
        assert!(pairing.unmatched_photos.is_empty());
        assert!(pairing.unmatched_videos.is_empty());
    }

    #[test]
    fn rejects_video_outside_window() {
        let assets = vec![
            photo("p1", "A.heic", "2022-06-03T21:02:35.193Z"),
            video("v1", "A.mov", "2022-06-03T21:02:30.000Z"),
        ];
        let pairing = pair_assets(&assets, Duration::from_secs(2));
        assert!(pairing.pairs.is_empty());
        assert_eq!(pairing.unmatched_photos.len(), 1);
        assert_eq!(pairing.unmatched_videos.len(), 1);
    }

    #[test]
    fn boundary_delta_is_inclusive() {
        let assets = vec![
            photo("p1", "A.heic", "2022-06-03T21:02:37.000Z"),
            video("v1", "A.mov", "2022-06-03T21:02:34.000Z"),
        ];
        let pairing = pair_assets(&assets, Duration::from_secs(3));
        assert_eq!(ids(&pairing), vec![("p1", "v1")]);
    }

    #[test]
    fn picks_smallest_delta_among_candidates() {
        let assets = vec![
            photo("p1", "A.heic", "2022-06-03T21:02:35.000Z"),
            video("v-far", "A.mov", "2022-06-03T21:02:33.000Z"),
            video("v-near", "A_1.mov", "2022-06-03T21:02:35.400Z"),
        ];
        let pairing = pair_assets(&assets, Duration::from_secs(3));
        assert_eq!(ids(&pairing), vec![("p1", "v-near")]);
        assert_eq!(pairing.unmatched_videos[0].id, "v-far");
    }

    #[test]
    fn exact_tie_goes_to_first_listed_video() {
        let assets = vec![
            video("v-first", "A.mov", "2022-06-03T21:02:34.000Z"),
            photo("p1", "A.heic", "2022-06-03T21:02:35.000Z"),
            video("v-second", "A_2.mov", "2022-06-03T21:02:36.000Z"),
        ];
        let pairing = pair_assets(&assets, Duration::from_secs(3));
        assert_eq!(ids(&pairing), vec![("p1", "v-first")]);
    }

    #[test]
    fn video_is_never_shared_between_photos() {
        let assets = vec![
            photo("p1", "A.heic", "2022-06-03T21:02:35.000Z"),
            photo("p2", "A.jpg", "2022-06-03T21:02:35.100Z"),
            video("v1", "A.mov", "2022-06-03T21:02:35.050Z"),
        ];
        let pairing = pair_assets(&assets, Duration::from_secs(3));
        assert_eq!(ids(&pairing), vec![("p1", "v1")]);
        assert_eq!(pairing.unmatched_photos[0].id, "p2");
    }

    #[test]
    fn video_of_linked_photo_is_not_offered() {
        let assets = vec![
            linked_photo("p-linked", "A.heic", "2022-06-03T21:02:35.000Z", "v1"),
            photo("p2", "A.jpg", "2022-06-03T21:02:35.000Z"),
            video("v1", "A.mov", "2022-06-03T21:02:35.000Z"),
        ];
        let pairing = pair_assets(&assets, Duration::from_secs(3));
        assert!(pairing.pairs.is_empty());
        assert_eq!(pairing.unmatched_photos.len(), 1);
        assert!(pairing.unmatched_videos.is_empty());
    }

    #[test]
    fn repeated_listing_entries_count_once() {
        let p = photo("p1", "A.heic", "2022-06-03T21:02:35.000Z");
        let v = video("v1", "A.mov", "2022-06-03T21:02:35.000Z");
        let assets = vec![p.clone(), v.clone(), p, v];
        let pairing = pair_assets(&assets, Duration::from_secs(3));
        assert_eq!(ids(&pairing), vec![("p1", "v1")]);
    }

    #[test]
    fn large_listing_never_reuses_an_asset_and_is_reproducible() {
        let mut assets = Vec::new();
        for n in 0..500 {
            let second = n % 50;
            assets.push(photo(
                &format!("p{n}"),
                &format!("IMG_{:04}.HEIC", n / 3),
                &format!("2023-01-01T10:00:{second:02}.000Z"),
            ));
            assets.push(video(
                &format!("v{n}"),
                &format!("IMG_{:04}_{}.MOV", n / 3, n % 10),
                &format!("2023-01-01T10:00:{:02}.500Z", (second + n % 2) % 60),
            ));
        }

        let first = pair_assets(&assets, DEFAULT_TOLERANCE);
        let second = pair_assets(&assets, DEFAULT_TOLERANCE);
        assert_eq!(first, second);
        assert!(!first.pairs.is_empty());

        let mut used = HashSet::new();
        for pair in &first.pairs {
            assert_ne!(pair.photo_asset_id, pair.video_asset_id);
            assert!(used.insert(pair.photo_asset_id.clone()));
            assert!(used.insert(pair.video_asset_id.clone()));
        }
    }

    #[test]
    fn ignores_non_media_assets() {
        let mut other = video("o1", "A.mov", "2022-06-03T21:02:35.000Z");
        other.kind = MediaKind::Other;
        let assets = vec![photo("p1", "A.heic", "2022-06-03T21:02:35.000Z"), other];
        let pairing = pair_assets(&assets, DEFAULT_TOLERANCE);
        assert!(pairing.pairs.is_empty());
        assert!(pairing.unmatched_videos.is_empty());
    }
}
