//! Outlier classification of co-infection candidates
//!
//! Reads the persisted filter output, counts minority mutations per sample,
//! derives a statistical cutoff (mean + k standard deviations, or a hard
//! override) and builds a per-position comparative table for each sample
//! above the cutoff.

use crate::filter::AnalysisResult;
use crate::{MinvarResult, PopulationPolicy, ReportConfig};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

/// One minority mutation carried by a sample
#[derive(Debug, Clone, PartialEq)]
pub struct MinorityMutation {
    pub position: u64,
    pub allele: String,
    pub freq: f64,
}

/// One row of a candidate's comparative table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateRow {
    pub pos: u64,
    /// Candidate's consensus allele at the position
    pub consensus: String,
    /// True when no other sample shows the minority allele as either a
    /// consensus or a minority call at this position
    pub sample_exclusive: bool,
    /// Candidate's total recorded read depth at the position
    pub dp: u32,
    /// The candidate's minority allele
    pub min_mut: String,
    /// Minority frequency rounded to 2 decimals
    pub min_freq: f64,
    /// Space-joined "allele:count" tallies of consensus calls across all
    /// samples at the position; "N" consensus calls are omitted
    pub aln_consensus: String,
}

/// Output of the classification stage
#[derive(Debug, Clone)]
pub struct ClassifierReport {
    pub cutoff: f64,
    /// Minority-mutation count per sample entering the population
    pub counts: IndexMap<String, usize>,
    pub candidates: Vec<String>,
    pub tables: IndexMap<String, Vec<CandidateRow>>,
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0)
pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Minority mutations per sample, recovered from the retained entries
pub fn minority_mutations(result: &AnalysisResult) -> IndexMap<String, Vec<MinorityMutation>> {
    let mut per_sample: IndexMap<String, Vec<MinorityMutation>> = IndexMap::new();
    for (pos, entries) in &result.entries_data {
        for (sample, entry) in entries {
            if let Some(minority) = &entry.minority {
                per_sample
                    .entry(sample.clone())
                    .or_default()
                    .push(MinorityMutation {
                        position: *pos,
                        allele: minority.allele.clone(),
                        freq: minority.freq,
                    });
            }
        }
    }
    per_sample
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Classify co-infection candidates and build their comparative tables.
pub fn comparative_analysis(
    result: &AnalysisResult,
    config: &ReportConfig,
) -> MinvarResult<ClassifierReport> {
    config.validate()?;

    let per_sample = minority_mutations(result);

    let mut counts: IndexMap<String, usize> =
        per_sample.iter().map(|(s, muts)| (s.clone(), muts.len())).collect();
    if config.population == PopulationPolicy::IncludeZeroCounts {
        for entries in result.entries_data.values() {
            for sample in entries.keys() {
                counts.entry(sample.clone()).or_insert(0);
            }
        }
    }

    if counts.is_empty() {
        log::warn!("no samples carry minority mutations; nothing to classify");
        return Ok(ClassifierReport {
            cutoff: config.min_lowfreq.map(f64::from).unwrap_or(0.0),
            counts,
            candidates: Vec::new(),
            tables: IndexMap::new(),
        });
    }

    let cutoff = match config.min_lowfreq {
        Some(hard) => {
            log::info!("using hard minority-count cutoff: {}", hard);
            f64::from(hard)
        }
        None => {
            let values: Vec<f64> = counts.values().map(|c| *c as f64).collect();
            let (m, sd) = (mean(&values), std_dev(&values));
            let cutoff = m + config.deviation_lowfreq * sd;
            log::info!(
                "minority-count population: n={} mean={:.4} stddev={:.4} cutoff={:.4}",
                values.len(),
                m,
                sd,
                cutoff
            );
            cutoff
        }
    };

    let candidates: Vec<String> = counts
        .iter()
        .filter(|(_, count)| **count as f64 > cutoff)
        .map(|(sample, _)| sample.clone())
        .collect();

    let mut tables = IndexMap::new();
    for candidate in &candidates {
        tables.insert(
            candidate.clone(),
            candidate_table(result, candidate, &per_sample[candidate])?,
        );
    }

    Ok(ClassifierReport {
        cutoff,
        counts,
        candidates,
        tables,
    })
}

fn candidate_table(
    result: &AnalysisResult,
    candidate: &str,
    mutations: &[MinorityMutation],
) -> MinvarResult<Vec<CandidateRow>> {
    let mut mutations: Vec<&MinorityMutation> = mutations.iter().collect();
    mutations.sort_by_key(|m| m.position);

    let mut rows = Vec::with_capacity(mutations.len());
    for mutation in mutations {
        let entries = &result.entries_data[&mutation.position];

        let mut tally: IndexMap<&str, u32> = IndexMap::new();
        let mut other_alleles: HashSet<&str> = HashSet::new();
        for (sample, entry) in entries {
            *tally.entry(entry.consensus.as_str()).or_insert(0) += 1;
            if sample != candidate {
                other_alleles.insert(entry.consensus.as_str());
                if let Some(minority) = &entry.minority {
                    other_alleles.insert(minority.allele.as_str());
                }
            }
        }

        // the minority designation degenerates when the same allele is a
        // consensus call at its own position; keep the row but flag it
        if let Some(consensus_count) = tally.get(mutation.allele.as_str()) {
            if *consensus_count > 0 {
                log::warn!(
                    "minority allele {} at position {} is also a consensus call in {} sample(s)",
                    mutation.allele,
                    mutation.position,
                    consensus_count
                );
            }
        }

        let candidate_entry = &entries[candidate];
        let aln_consensus = tally
            .iter()
            .filter(|(allele, _)| **allele != crate::vcf::NO_CALL_SYMBOL)
            .map(|(allele, count)| format!("{}:{}", allele, count))
            .collect::<Vec<_>>()
            .join(" ");

        rows.push(CandidateRow {
            pos: mutation.position,
            consensus: candidate_entry.consensus.clone(),
            sample_exclusive: !other_alleles.contains(mutation.allele.as_str()),
            dp: candidate_entry.total_depth(),
            min_mut: mutation.allele.clone(),
            min_freq: round2(mutation.freq),
            aln_consensus,
        });
    }
    Ok(rows)
}

/// Write one CSV table per candidate plus the minority-count distribution.
pub fn write_report<P: AsRef<Path>>(report: &ClassifierReport, out_dir: P) -> MinvarResult<()> {
    let out_dir = out_dir.as_ref();
    std::fs::create_dir_all(out_dir)?;

    for (candidate, rows) in &report.tables {
        let path = out_dir.join(format!("{}.csv", candidate));
        let mut writer = csv::Writer::from_path(&path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        log::info!("wrote {:?} ({} rows)", path, rows.len());
    }

    // headless stand-in for the count-distribution histogram
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(out_dir.join("distribution.tsv"))?;
    writer.write_record(["sample", "count"])?;
    for (sample, count) in &report.counts {
        writer.write_record([sample.as_str(), count.to_string().as_str()])?;
    }
    writer.flush()?;
    log::info!("minority-count cutoff: {:.4}", report.cutoff);

    log::info!(
        "report complete: {} candidate(s) were processed",
        report.candidates.len()
    );
    Ok(())
}

/// Run the whole classification stage and write its outputs.
pub fn run_report<P: AsRef<Path>>(
    result: &AnalysisResult,
    config: &ReportConfig,
    out_dir: P,
) -> MinvarResult<ClassifierReport> {
    let report = comparative_analysis(result, config)?;
    write_report(&report, out_dir)?;
    Ok(report)
}
