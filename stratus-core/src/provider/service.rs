//! Driver-agnostic provider services: template ranking, image search and
//! state waiters shared by every resource service.

use super::scanner::ScannerDb;
use super::Provider;
use crate::error::{Result, StratusError};
use crate::metadata::Store;
use crate::model::{Host, HostState, HostTemplate, Image, SizingRequirements, Volume, VolumeState};
use crate::retry::{self, Arbiter, Backoff};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Dominant Resource Fairness weight of a core.
pub const CORE_DRF_WEIGHT: f32 = 1.0;
/// Dominant Resource Fairness weight of 1 GiB of RAM.
pub const RAM_DRF_WEIGHT: f32 = 1.0 / 8.0;
/// Dominant Resource Fairness weight of 1 GiB of disk.
pub const DISK_DRF_WEIGHT: f32 = 1.0 / 16.0;

/// Dominant Resource Fairness rank of a template; smaller is better.
pub fn rank_drf(template: &HostTemplate) -> f32 {
    template.cores as f32 * CORE_DRF_WEIGHT
        + template.ram_size * RAM_DRF_WEIGHT
        + template.disk_size as f32 * DISK_DRF_WEIGHT
}

/// A driver bundled with the tenant's metadata store.
///
/// This is what resource services hold: every driver call and every metadata
/// access goes through here.
#[derive(Clone)]
pub struct CloudService {
    provider: Arc<dyn Provider>,
    metadata: Store,
    scanner: Arc<ScannerDb>,
}

impl CloudService {
    /// Bundle a driver with its metadata store, provisioning the metadata
    /// bucket if needed.
    pub async fn build(provider: Arc<dyn Provider>) -> Result<Self> {
        let bucket = provider.config_options().metadata_bucket.clone();
        if bucket.is_empty() {
            return Err(StratusError::invalid_request("metadata_bucket", "no bucket configured"));
        }
        let metadata = Store::new(provider.object_storage(), bucket);
        metadata.init().await?;
        Ok(Self { provider, metadata, scanner: Arc::new(ScannerDb::open_default()) })
    }

    /// Same, with an explicit scanner database (tests).
    pub async fn build_with_scanner(provider: Arc<dyn Provider>, scanner: ScannerDb) -> Result<Self> {
        let mut service = Self::build(provider).await?;
        service.scanner = Arc::new(scanner);
        Ok(service)
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn metadata(&self) -> &Store {
        &self.metadata
    }

    /// Select templates satisfying the sizing lower bounds, ranked by DRF.
    ///
    /// GPU or frequency constraints require scanner data: with `force` the
    /// selection fails when the database is absent or empty, without it the
    /// constraints are dropped with a warning.
    #[instrument(skip(self))]
    pub async fn select_templates_by_size(
        &self,
        sizing: &SizingRequirements,
        force: bool,
    ) -> Result<Vec<HostTemplate>> {
        let templates = self.provider.list_templates(false).await?;

        let wants_scanner_facts = sizing.min_gpu > 0 || sizing.min_freq != 0.0;
        let scanner_templates: Option<HashSet<String>> = if wants_scanner_facts {
            match self.scanner.read_all() {
                Ok(records) if !records.is_empty() => Some(
                    records
                        .into_iter()
                        .filter(|r| r.gpu >= sizing.min_gpu && r.cpu_frequency_ghz >= sizing.min_freq)
                        .map(|r| r.template_id)
                        .collect(),
                ),
                Ok(_) | Err(_) if force => {
                    return Err(StratusError::infra(format!(
                        "unable to select a template with {} GPU(s) and {} GHz: no scanner data",
                        sizing.min_gpu, sizing.min_freq
                    )));
                }
                Ok(_) | Err(_) => {
                    warn!("scanner database absent or empty, ignoring GPU and frequency bounds");
                    None
                }
            }
        } else {
            None
        };

        debug!(
            "looking for a machine with at least {} cores, {:.01} GiB RAM, {} GiB disk",
            sizing.min_cores, sizing.min_ram_size, sizing.min_disk_size
        );

        let mut selected: Vec<HostTemplate> = templates
            .into_iter()
            .filter(|t| {
                t.cores >= sizing.min_cores
                    && t.ram_size >= sizing.min_ram_size
                    && (sizing.min_disk_size == 0
                        || t.disk_size == 0
                        || t.disk_size >= sizing.min_disk_size)
            })
            .filter(|t| match &scanner_templates {
                Some(ids) => ids.contains(&t.id),
                None => true,
            })
            .collect();

        selected.sort_by(|a, b| {
            rank_drf(a).partial_cmp(&rank_drf(b)).unwrap_or(Ordering::Equal)
        });
        Ok(selected)
    }

    /// Find the backend image best matching a free-form hint.
    #[instrument(skip(self))]
    pub async fn search_image(&self, hint: &str) -> Result<Image> {
        let images = self.provider.list_images(false).await?;
        let mut best_score = 0.0;
        let mut best: Option<&Image> = None;
        for image in &images {
            let score = similarity_score(hint, &image.name);
            if score > best_score {
                best_score = score;
                best = Some(image);
            }
        }
        match best {
            Some(image) if best_score >= 0.5 => {
                debug!("selected image '{}' (id {})", image.name, image.id);
                Ok(image.clone())
            }
            _ => Err(StratusError::not_found("image matching", hint)),
        }
    }

    /// Poll the driver until the host reaches `state`.
    ///
    /// A host falling into the error state aborts the wait immediately.
    pub async fn wait_host_state(
        &self,
        id: &str,
        state: HostState,
        timeout: Duration,
    ) -> Result<()> {
        let result = retry::action(
            || async {
                let current = self.provider.get_host_state(id).await?;
                if current == state {
                    return Ok(());
                }
                if current == HostState::Error {
                    return Err(StratusError::infra("host in error state"));
                }
                Err(StratusError::transient(format!("host state is '{current}'")))
            },
            Arbiter::PrevailDone(vec![
                Arbiter::UnsuccessfulWhereRetcode255,
                Arbiter::Timeout(timeout),
            ]),
            Backoff::Constant(Duration::from_secs(2)),
            None,
        )
        .await;
        result.map_err(|e| {
            if e.is_timeout() {
                StratusError::timeout(
                    format!("waiting host '{id}' to reach state '{state}'"),
                    timeout,
                    Some(e),
                )
            } else {
                e
            }
        })
    }

    /// Poll the driver until the volume reaches `state` and return it.
    pub async fn wait_volume_state(
        &self,
        id: &str,
        state: VolumeState,
        timeout: Duration,
    ) -> Result<Volume> {
        let slot = tokio::sync::Mutex::new(None);
        let result = retry::action(
            || async {
                let volume = self.provider.get_volume(id).await?;
                if volume.state == state {
                    *slot.lock().await = Some(volume);
                    return Ok(());
                }
                if volume.state == VolumeState::Error {
                    return Err(StratusError::infra("volume in error state"));
                }
                Err(StratusError::transient(format!("volume state is '{}'", volume.state)))
            },
            Arbiter::PrevailDone(vec![
                Arbiter::UnsuccessfulWhereRetcode255,
                Arbiter::Timeout(timeout),
            ]),
            Backoff::Constant(Duration::from_secs(2)),
            None,
        )
        .await;
        match result {
            Ok(()) => {
                let volume = slot.lock().await.take();
                volume.ok_or_else(|| StratusError::logic("volume wait finished without a volume"))
            }
            Err(e) if e.is_timeout() => Err(StratusError::timeout(
                format!("waiting volume '{id}' to reach state '{state}'"),
                timeout,
                Some(e),
            )),
            Err(e) => Err(e),
        }
    }

    /// Refresh a host from the backend.
    pub async fn inspect_host(&self, host: &mut Host) -> Result<()> {
        self.provider.inspect_host(host).await
    }
}

// ---------------------------------------------------------------------------
// Image similarity: path-distance over rune positions
// ---------------------------------------------------------------------------

fn rune_indexes(s: &[char], wanted: char) -> Vec<i32> {
    s.iter()
        .enumerate()
        .filter(|(_, c)| **c == wanted)
        .map(|(i, _)| i as i32)
        .collect()
}

fn runes_indexes(reference: &str, s: &str) -> Vec<Vec<i32>> {
    let upper: Vec<char> = s.to_uppercase().chars().collect();
    reference
        .to_uppercase()
        .chars()
        .filter(|c| *c != ' ')
        .map(|c| rune_indexes(&upper, c))
        .collect()
}

fn possible_paths(positions: &[Vec<i32>], level: usize) -> Vec<Vec<i32>> {
    if level >= positions.len() {
        return vec![Vec::new()];
    }
    let tails = possible_paths(positions, level + 1);
    let heads: &[i32] = if positions[level].is_empty() { &[-1] } else { &positions[level] };
    let mut paths = Vec::new();
    for head in heads {
        for tail in &tails {
            let mut path = Vec::with_capacity(tail.len() + 1);
            path.push(*head);
            path.extend_from_slice(tail);
            paths.push(path);
        }
    }
    paths
}

/// Sum of forward distances along a rune-assignment path; wrap-arounds and
/// unmatched runes are penalized by the candidate length.
fn path_distance(path: &[i32], size: i32) -> i32 {
    let mut distance = 0;
    let mut previous = path[0];
    for index in path {
        if *index < 0 {
            distance += size;
        } else {
            let step = index - previous;
            distance += step;
            if step < 0 {
                distance += step + size;
            }
            previous = *index;
        }
    }
    distance
}

fn best_path_distance(paths: &[Vec<i32>], size: i32) -> i32 {
    paths.iter().map(|p| path_distance(p, size)).min().unwrap_or(10000)
}

/// Similarity between a hint and a candidate, in [0, +inf); 1.0 means the
/// hint appears contiguously, relative length differences discount the score.
pub fn similarity_score(reference: &str, s: &str) -> f64 {
    let size = s.chars().count() as i32;
    let rsize = reference.chars().count() as i32;
    if rsize > size {
        return similarity_score(s, reference);
    }
    let distance = best_path_distance(&possible_paths(&runes_indexes(reference, s), 0), size);
    if distance <= 0 {
        return 0.0;
    }
    let relative_gap = (size - rsize).abs() as f64 / rsize as f64;
    let raw = (rsize as f64 - 1.0) / distance as f64;
    raw / (10.0 * (1.0 + relative_gap)).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: &str, cores: i32, ram: f32, disk: i32) -> HostTemplate {
        HostTemplate {
            id: id.into(),
            name: id.into(),
            cores,
            ram_size: ram,
            disk_size: disk,
            ..Default::default()
        }
    }

    #[test]
    fn drf_rank_orders_by_weighted_size() {
        let small = template("s", 2, 8.0, 40);
        let large = template("l", 8, 64.0, 400);
        assert!(rank_drf(&small) < rank_drf(&large));
    }

    #[test]
    fn drf_rank_is_deterministic_for_equal_templates() {
        let a = template("a", 4, 16.0, 100);
        let b = template("b", 4, 16.0, 100);
        assert_eq!(rank_drf(&a), rank_drf(&b));
    }

    #[test]
    fn similarity_prefers_the_right_release() {
        let catalog = ["Ubuntu 16.04 LTS", "Ubuntu 18.04 LTS", "Debian 9"];
        let scores: Vec<f64> =
            catalog.iter().map(|name| similarity_score("Ubuntu 16.04", name)).collect();
        assert!(scores[0] > scores[1], "{scores:?}");
        assert!(scores[0] > scores[2], "{scores:?}");
        assert!(scores[0] >= 0.5, "{scores:?}");
    }

    #[test]
    fn similarity_of_unrelated_names_is_low() {
        assert!(similarity_score("Ubuntu 16.04", "Windows Server 2016") < 0.5);
    }
}
