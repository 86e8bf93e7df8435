//! Minority-variant filter stage
//!
//! Streams a multi-sample VCF through three passes: a structural position
//! filter (at least one heterozygous sample with sufficient per-allele
//! depth), a coverage filter (too many no-call samples excludes the
//! position), and the minority-variant extractor that applies the frequency
//! and depth thresholds. The output is an immutable [`AnalysisResult`]
//! persisted as JSON and consumed by the report stage.

use crate::utils::ensure_parent_dirs;
use crate::vcf::{VcfReader, VariantRecord, NO_CALL_SYMBOL};
use crate::{FilterConfig, MinvarError, MinvarResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Genotype and depth data for one sample retained at one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleVariant {
    /// Distinct genotype symbols in encounter order; "N" for no-calls
    pub genotype: Vec<String>,
    /// Recorded depth per allele symbol, in allele-index order.
    /// Alleles whose AD entry was "." are absent, not zero.
    pub allele_depths: IndexMap<String, u32>,
}

impl SampleVariant {
    /// Sum over all recorded allele depths, independent of which
    /// alleles were called
    pub fn total_depth(&self) -> u32 {
        self.allele_depths.values().sum()
    }

    pub fn is_no_call(&self) -> bool {
        self.genotype.iter().any(|g| g == NO_CALL_SYMBOL)
    }
}

/// Working map produced by the structural position filter
#[derive(Debug)]
pub struct PositionMap {
    /// Sample names from the VCF header, in column order
    pub samples: Vec<String>,
    pub positions: IndexMap<u64, IndexMap<String, SampleVariant>>,
    /// Number of data lines seen
    pub variable_sites: u64,
    /// Number of distinct non-"*"/non-"N" alternate alleles seen
    pub mutation_count: u64,
}

/// A minority allele call that passed the frequency and depth thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinorityCall {
    pub allele: String,
    pub freq: f64,
}

/// Per-sample entry of a retained position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    /// Highest-frequency allele at the call (or the sole genotype symbol)
    pub consensus: String,
    /// Present only when the minority allele met both thresholds
    pub minority: Option<MinorityCall>,
    pub genotype: Vec<String>,
    pub allele_depths: IndexMap<String, u32>,
}

impl SampleEntry {
    pub fn total_depth(&self) -> u32 {
        self.allele_depths.values().sum()
    }
}

/// A call whose minority frequency was sufficient but whose depth was not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardedCall {
    pub position: u64,
    pub allele_depths: IndexMap<String, u32>,
}

/// Persisted output of the filter stage, read-only for the report stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// "{pos}_{allele}" mutation key -> samples carrying that minority allele
    pub variant_samples: IndexMap<String, Vec<String>>,
    /// Position -> per-sample entries, for positions with at least one
    /// valid minority variant
    pub entries_data: IndexMap<u64, IndexMap<String, SampleEntry>>,
    pub discarded_low_depth: IndexMap<String, Vec<DiscardedCall>>,
    /// Positions dropped by the coverage filter
    pub excluded_positions: Vec<u64>,
    /// Minority-allele frequencies across all counted calls
    pub low_freq_freq: Vec<f64>,
    /// Consensus-allele frequencies across all heterozygous calls
    pub high_freq_freq: Vec<f64>,
}

impl AnalysisResult {
    /// Join key between a position and the samples carrying its minority allele
    pub fn mutation_key(position: u64, allele: &str) -> String {
        format!("{}_{}", position, allele)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> MinvarResult<()> {
        ensure_parent_dirs(&path)?;
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> MinvarResult<Self> {
        let file = File::open(&path)
            .map_err(|_| MinvarError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Decode a VCF and retain positions where at least one sample is
/// heterozygous with every recorded allele depth above the threshold.
/// Positions failing this structural test are simply absent from the map.
pub fn scan_vcf<P: AsRef<Path>>(path: P, config: &FilterConfig) -> MinvarResult<PositionMap> {
    let mut reader = VcfReader::open(path)?;
    let samples = reader.samples().to_vec();

    let mut positions = IndexMap::new();
    let mut variable_sites = 0u64;
    let mut mutation_count = 0u64;

    for record in reader.records() {
        let record = record?;
        variable_sites += 1;
        mutation_count += record
            .alternates
            .iter()
            .filter(|a| a.as_str() != "*" && a.as_str() != NO_CALL_SYMBOL)
            .collect::<HashSet<_>>()
            .len() as u64;

        if record.calls.len() != samples.len() {
            return Err(MinvarError::InvalidRecord(format!(
                "position {} has {} sample columns, header names {} samples",
                record.position,
                record.calls.len(),
                samples.len()
            )));
        }

        if let Some(pos_data) = filter_position(&record, &samples, config)? {
            positions.insert(record.position, pos_data);
        }
    }

    log::info!("number of variable sites: {}", variable_sites);
    log::info!("number of mutations: {}", mutation_count);

    Ok(PositionMap {
        samples,
        positions,
        variable_sites,
        mutation_count,
    })
}

fn filter_position(
    record: &VariantRecord,
    samples: &[String],
    config: &FilterConfig,
) -> MinvarResult<Option<IndexMap<String, SampleVariant>>> {
    let mut pos_data = IndexMap::new();
    let mut has_candidate = false;

    for (sample, call) in samples.iter().zip(&record.calls) {
        // samples with no recorded depth at all carry no usable signal
        let Some(min_depth) = call.min_recorded_depth() else {
            continue;
        };

        let mut allele_depths = IndexMap::new();
        for (index, depth) in call.allele_depths.iter().enumerate() {
            if let Some(depth) = depth {
                allele_depths.insert(record.symbol_at(index)?.to_string(), *depth);
            }
        }

        let mut genotype = Vec::new();
        for allele in &call.genotype {
            let symbol = record.symbol_of(*allele)?.to_string();
            if !genotype.contains(&symbol) {
                genotype.push(symbol);
            }
        }

        if min_depth > config.min_allele_depth && call.is_heterozygous() {
            has_candidate = true;
        }

        pos_data.insert(
            sample.clone(),
            SampleVariant {
                genotype,
                allele_depths,
            },
        );
    }

    Ok(has_candidate.then_some(pos_data))
}

/// Positions whose called (non-N) sample fraction is strictly below the
/// coverage threshold. A position exactly at the threshold is retained.
pub fn coverage_excluded(map: &PositionMap, config: &FilterConfig) -> Vec<u64> {
    let sample_count = map.samples.len();
    map.positions
        .iter()
        .filter_map(|(pos, samples_variants)| {
            let no_calls = samples_variants
                .values()
                .filter(|sv| sv.is_no_call())
                .count();
            let called_fraction = 1.0 - no_calls as f64 / sample_count as f64;
            (called_fraction < config.min_coverage).then_some(*pos)
        })
        .collect()
}

/// Apply the coverage filter and the frequency/depth thresholds, producing
/// the persisted analysis result.
///
/// At a heterozygous call the alleles are ranked by ascending recorded
/// depth with a stable sort, so frequency ties resolve to the
/// earliest-encountered allele (reference before alternates, alternates in
/// declaration order). The lowest-ranked allele is the minority candidate,
/// the highest-ranked is the consensus.
pub fn extract_minority_variants(map: &PositionMap, config: &FilterConfig) -> AnalysisResult {
    let mut result = AnalysisResult {
        excluded_positions: coverage_excluded(map, config),
        ..AnalysisResult::default()
    };
    log::info!(
        "excluded positions (no-call fraction above threshold): {}",
        result.excluded_positions.len()
    );
    let excluded: HashSet<u64> = result.excluded_positions.iter().copied().collect();

    for (pos, samples_variants) in &map.positions {
        if excluded.contains(pos) {
            continue;
        }

        let mut entries = IndexMap::new();
        let mut position_samples: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut valid_minority = false;

        for (sample, sv) in samples_variants {
            let entry = if sv.genotype.len() > 1 {
                extract_sample_call(
                    *pos,
                    sample,
                    sv,
                    config,
                    &mut result,
                    &mut position_samples,
                    &mut valid_minority,
                )
            } else {
                SampleEntry {
                    consensus: sv.genotype[0].clone(),
                    minority: None,
                    genotype: sv.genotype.clone(),
                    allele_depths: sv.allele_depths.clone(),
                }
            };
            entries.insert(sample.clone(), entry);
        }

        if valid_minority {
            result.entries_data.insert(*pos, entries);
            for (key, samples) in position_samples {
                result.variant_samples.entry(key).or_default().extend(samples);
            }
        }
    }

    log::info!("low freq positions: {}", result.entries_data.len());
    log::info!("low freq mutations: {}", result.variant_samples.len());

    result
}

fn extract_sample_call(
    pos: u64,
    sample: &str,
    sv: &SampleVariant,
    config: &FilterConfig,
    result: &mut AnalysisResult,
    position_samples: &mut IndexMap<String, Vec<String>>,
    valid_minority: &mut bool,
) -> SampleEntry {
    let total = sv.total_depth();
    if total == 0 {
        // no frequency is computable; treat like a homozygous call
        return SampleEntry {
            consensus: sv.genotype[0].clone(),
            minority: None,
            genotype: sv.genotype.clone(),
            allele_depths: sv.allele_depths.clone(),
        };
    }

    let mut ranked: Vec<(&String, u32)> = sv.allele_depths.iter().map(|(k, v)| (k, *v)).collect();
    ranked.sort_by_key(|&(_, depth)| depth);

    let (minority_allele, minority_depth) = ranked[0];
    let (consensus_allele, consensus_depth) = ranked[ranked.len() - 1];
    let minority_freq = minority_depth as f64 / total as f64;
    let consensus_freq = consensus_depth as f64 / total as f64;

    let mut minority = None;
    if minority_freq >= config.min_freq {
        if total > config.min_allele_depth {
            position_samples
                .entry(AnalysisResult::mutation_key(pos, minority_allele))
                .or_default()
                .push(sample.to_string());
            *valid_minority = true;
            result.low_freq_freq.push(minority_freq);
            result.high_freq_freq.push(consensus_freq);
            minority = Some(MinorityCall {
                allele: minority_allele.clone(),
                freq: minority_freq,
            });
        } else {
            // frequency sufficient, depth too low: excluded from the count
            result
                .discarded_low_depth
                .entry(sample.to_string())
                .or_default()
                .push(DiscardedCall {
                    position: pos,
                    allele_depths: sv.allele_depths.clone(),
                });
        }
    } else {
        result.high_freq_freq.push(consensus_freq);
    }

    SampleEntry {
        consensus: consensus_allele.clone(),
        minority,
        genotype: sv.genotype.clone(),
        allele_depths: sv.allele_depths.clone(),
    }
}

/// Run the whole filter stage: decode, position filter, coverage filter,
/// minority extraction.
pub fn run_filter<P: AsRef<Path>>(
    vcf_path: P,
    config: &FilterConfig,
) -> MinvarResult<AnalysisResult> {
    config.validate()?;

    log::info!("running lowfreq variant detection with:");
    log::info!("- minimum allele read depth: {}", config.min_allele_depth);
    log::info!("- minimum called-sample fraction: {}", config.min_coverage);
    log::info!("- minimum minority variant frequency: {}", config.min_freq);

    let map = scan_vcf(vcf_path, config)?;
    Ok(extract_minority_variants(&map, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT";

    fn write_vcf(samples: &[&str], lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "##fileformat=VCFv4.2").unwrap();
        writeln!(file, "{}\t{}", HEADER, samples.join("\t")).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    fn config(mad: u32, mc: f64, mf: f64) -> FilterConfig {
        FilterConfig {
            min_allele_depth: mad,
            min_coverage: mc,
            min_freq: mf,
        }
    }

    #[test]
    fn test_minority_variant_at_frequency_threshold() {
        // minority frequency exactly 10/50 = 0.2 meets >= min_freq
        let file = write_vcf(
            &["S1", "S2", "S3"],
            &[
                "chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:40,10:50\t0/0:50,0:50\t0/0:50,0:50"
                    .to_string(),
            ],
        );
        let result = run_filter(file.path(), &config(5, 0.8, 0.2)).unwrap();

        assert_eq!(result.variant_samples["100_G"], vec!["S1"]);
        assert_eq!(result.low_freq_freq, vec![0.2]);
        assert_eq!(result.high_freq_freq, vec![0.8]);

        let entry = &result.entries_data[&100]["S1"];
        assert_eq!(entry.consensus, "A");
        let minority = entry.minority.as_ref().unwrap();
        assert_eq!(minority.allele, "G");
        assert_eq!(minority.freq, 0.2);

        // homozygous samples get their sole genotype symbol as consensus
        assert_eq!(result.entries_data[&100]["S2"].consensus, "A");
        assert!(result.entries_data[&100]["S2"].minority.is_none());
    }

    #[test]
    fn test_minority_below_frequency_threshold_not_recorded() {
        // S2 retains the position; S1's minority freq 2/42 is below 0.2,
        // so S1 is not counted but its consensus frequency still lands in
        // the distribution
        let file = write_vcf(
            &["S1", "S2", "S3"],
            &[
                "chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:40,2:42\t0/1:30,20:50\t0/0:50,0:50"
                    .to_string(),
            ],
        );
        let result = run_filter(file.path(), &config(5, 0.8, 0.2)).unwrap();

        assert_eq!(result.variant_samples.len(), 1);
        assert_eq!(result.variant_samples["100_G"], vec!["S2"]);
        assert!(result.entries_data[&100]["S1"].minority.is_none());
        // S1's consensus freq 40/42 and S2's 30/50 are both recorded
        assert!(result
            .high_freq_freq
            .iter()
            .any(|f| (f - 40.0 / 42.0).abs() < 1e-12));
        assert!(result.high_freq_freq.iter().any(|f| (f - 0.6).abs() < 1e-12));
    }

    #[test]
    fn test_position_dropped_by_structural_prefilter() {
        // no sample is heterozygous with all recorded depths above the
        // threshold: the position is absent, not excluded
        let file = write_vcf(
            &["S1", "S2"],
            &["chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:40,2:42\t0/0:50,0:50".to_string()],
        );
        let result = run_filter(file.path(), &config(5, 0.8, 0.2)).unwrap();

        assert!(result.entries_data.is_empty());
        assert!(result.excluded_positions.is_empty());
        assert!(result.high_freq_freq.is_empty());
    }

    #[test]
    fn test_coverage_filter_excludes_mostly_no_call_position() {
        // 4 of 5 samples are no-calls with a recorded depth: called
        // fraction 0.2 < 0.8 excludes the position
        let file = write_vcf(
            &["S1", "S2", "S3", "S4", "S5"],
            &[
                "chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:40,10:50\t./.:0:0\t./.:0:0\t./.:0:0\t./.:0:0"
                    .to_string(),
            ],
        );
        let result = run_filter(file.path(), &config(5, 0.8, 0.2)).unwrap();

        assert_eq!(result.excluded_positions, vec![100]);
        assert!(result.entries_data.is_empty());
        assert!(result.variant_samples.is_empty());
    }

    #[test]
    fn test_coverage_threshold_boundary_is_strict() {
        // 1 of 5 no-calls: called fraction exactly 0.8 is retained
        let file = write_vcf(
            &["S1", "S2", "S3", "S4", "S5"],
            &[
                "chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:40,10:50\t./.:0:0\t0/0:50,0:50\t0/0:50,0:50\t0/0:50,0:50"
                    .to_string(),
            ],
        );
        let result = run_filter(file.path(), &config(5, 0.8, 0.2)).unwrap();

        assert!(result.excluded_positions.is_empty());
        assert_eq!(result.entries_data.len(), 1);
    }

    #[test]
    fn test_depth_exactly_at_threshold_is_discarded() {
        // S2's minority freq 0.5 meets min_freq but total depth 10 is not
        // strictly greater than min_allele_depth
        let file = write_vcf(
            &["S1", "S2"],
            &["chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:25,25:50\t0/1:5,5:10".to_string()],
        );
        let result = run_filter(file.path(), &config(10, 0.8, 0.2)).unwrap();

        let discarded = &result.discarded_low_depth["S2"];
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].position, 100);
        assert_eq!(discarded[0].allele_depths["A"], 5);
        assert_eq!(discarded[0].allele_depths["G"], 5);

        // S2's variant is not counted anywhere
        assert!(result.entries_data[&100]["S2"].minority.is_none());
        for samples in result.variant_samples.values() {
            assert!(!samples.contains(&"S2".to_string()));
        }
    }

    #[test]
    fn test_frequency_tie_resolves_to_first_encountered_allele() {
        // 25/25 split: the stable depth sort keeps allele-index order, so
        // the reference allele (index 0) becomes the minority
        let file = write_vcf(
            &["S1"],
            &["chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:25,25:50".to_string()],
        );
        let result = run_filter(file.path(), &config(5, 0.8, 0.2)).unwrap();

        let entry = &result.entries_data[&100]["S1"];
        assert_eq!(entry.minority.as_ref().unwrap().allele, "A");
        assert_eq!(entry.consensus, "G");
        assert!(result.variant_samples.contains_key("100_A"));
    }

    #[test]
    fn test_multiallelic_depth_map_and_missing_entry() {
        // the "." AD entry at the second alternate is absent from the
        // depth map and from the total-depth denominator
        let file = write_vcf(
            &["S1"],
            &["chr\t100\t.\tA\tG,T\t.\t.\t.\tGT:AD:DP\t0/1:40,20,.:60".to_string()],
        );
        let result = run_filter(file.path(), &config(5, 0.8, 0.2)).unwrap();

        let entry = &result.entries_data[&100]["S1"];
        assert_eq!(entry.allele_depths.len(), 2);
        assert!(!entry.allele_depths.contains_key("T"));
        let minority = entry.minority.as_ref().unwrap();
        assert_eq!(minority.allele, "G");
        assert!((minority.freq - 20.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_excluded_positions_disjoint_from_entries() {
        let file = write_vcf(
            &["S1", "S2", "S3", "S4", "S5"],
            &[
                "chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:40,10:50\t./.:0:0\t./.:0:0\t./.:0:0\t./.:0:0"
                    .to_string(),
                "chr\t200\t.\tC\tT\t.\t.\t.\tGT:AD:DP\t0/1:30,20:50\t0/0:50,0:50\t0/0:50,0:50\t0/0:50,0:50\t0/0:50,0:50"
                    .to_string(),
            ],
        );
        let result = run_filter(file.path(), &config(5, 0.8, 0.2)).unwrap();

        for pos in result.entries_data.keys() {
            assert!(!result.excluded_positions.contains(pos));
        }
        assert_eq!(result.excluded_positions, vec![100]);
        assert!(result.entries_data.contains_key(&200));
    }

    #[test]
    fn test_analysis_result_json_round_trip() {
        let file = write_vcf(
            &["S1", "S2"],
            &[
                "chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:40,10:50\t0/0:50,0:50".to_string(),
                "chr\t200\t.\tC\tT\t.\t.\t.\tGT:AD:DP\t0/1:5,5:10\t0/1:30,20:50".to_string(),
            ],
        );
        let result = run_filter(file.path(), &config(5, 0.8, 0.2)).unwrap();

        let out = NamedTempFile::new().unwrap();
        result.save(out.path()).unwrap();
        let loaded = AnalysisResult::load(out.path()).unwrap();
        assert_eq!(result, loaded);

        // field names of the persisted document are fixed
        let text = std::fs::read_to_string(out.path()).unwrap();
        for field in [
            "variant_samples",
            "entries_data",
            "discarded_low_depth",
            "excluded_positions",
            "low_freq_freq",
            "high_freq_freq",
        ] {
            assert!(text.contains(&format!("\"{}\"", field)), "missing {}", field);
        }
    }

    #[test]
    fn test_filter_stage_is_idempotent() {
        let file = write_vcf(
            &["S1", "S2"],
            &["chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:40,10:50\t0/1:30,20:50".to_string()],
        );
        let cfg = config(5, 0.8, 0.2);

        let out1 = NamedTempFile::new().unwrap();
        let out2 = NamedTempFile::new().unwrap();
        run_filter(file.path(), &cfg).unwrap().save(out1.path()).unwrap();
        run_filter(file.path(), &cfg).unwrap().save(out2.path()).unwrap();

        let bytes1 = std::fs::read(out1.path()).unwrap();
        let bytes2 = std::fs::read(out2.path()).unwrap();
        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn test_scan_statistics() {
        let file = write_vcf(
            &["S1"],
            &[
                "chr\t100\t.\tA\tG,T\t.\t.\t.\tGT:AD:DP\t0/1:40,10,0:50".to_string(),
                "chr\t200\t.\tC\t*\t.\t.\t.\tGT:AD:DP\t0/0:50:50".to_string(),
            ],
        );
        let map = scan_vcf(file.path(), &config(5, 0.8, 0.2)).unwrap();
        assert_eq!(map.variable_sites, 2);
        // "*" does not count as a mutation
        assert_eq!(map.mutation_count, 2);
    }

    #[test]
    fn test_sample_column_count_mismatch_is_fatal() {
        let file = write_vcf(
            &["S1", "S2"],
            &["chr\t100\t.\tA\tG\t.\t.\t.\tGT:AD:DP\t0/1:40,10:50".to_string()],
        );
        let err = scan_vcf(file.path(), &config(5, 0.8, 0.2)).unwrap_err();
        assert!(matches!(err, MinvarError::InvalidRecord(_)));
    }
}
