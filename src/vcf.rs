//! Multi-sample VCF decoding
//!
//! Streams one data line at a time from a plain or gzip-compressed VCF and
//! decodes it into a [`VariantRecord`] with per-sample genotype and
//! allele-depth data. Only the fields the minority-variant pipeline needs
//! are decoded; everything else is passed over.

use crate::utils::is_gzipped;
use crate::{MinvarError, MinvarResult};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Symbol reported for a missing genotype call
pub const NO_CALL_SYMBOL: &str = "N";

/// One allele of a genotype call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlleleCall {
    /// Index into {reference, alt1, alt2, ..}
    Called(usize),
    /// "." in the GT field
    NoCall,
}

impl AlleleCall {
    fn parse(token: &str) -> MinvarResult<Self> {
        if token == "." {
            return Ok(AlleleCall::NoCall);
        }
        token
            .parse::<usize>()
            .map(AlleleCall::Called)
            .map_err(|_| MinvarError::InvalidRecord(format!("invalid genotype allele: {}", token)))
    }
}

/// Positions of the mandatory per-sample annotations within the FORMAT column
#[derive(Debug, Clone, Copy)]
pub struct FormatIndices {
    pub gt: usize,
    pub ad: usize,
    pub dp: usize,
}

impl FormatIndices {
    /// Locate GT, AD and DP in a colon-separated FORMAT string.
    /// Absence of any of them is a fatal configuration error.
    pub fn from_format(format: &str) -> MinvarResult<Self> {
        let fields: Vec<&str> = format.split(':').collect();
        let find = |name: &str| {
            fields
                .iter()
                .position(|&f| f == name)
                .ok_or_else(|| MinvarError::MissingFormatField(name.to_string()))
        };
        Ok(FormatIndices {
            gt: find("GT")?,
            ad: find("AD")?,
            dp: find("DP")?,
        })
    }
}

/// Decoded genotype and allele-depth data for one sample at one position
#[derive(Debug, Clone)]
pub struct GenotypeData {
    /// Allele calls as written, "/" and "|" separators treated alike
    pub genotype: Vec<AlleleCall>,
    /// Depths aligned by index to {reference, alt1, ..}; None for "." entries,
    /// which carry no depth and must stay out of every depth computation
    pub allele_depths: Vec<Option<u32>>,
}

impl GenotypeData {
    pub fn decode(sample_field: &str, indices: &FormatIndices) -> MinvarResult<Self> {
        let parts: Vec<&str> = sample_field.split(':').collect();
        let gt = parts.get(indices.gt).ok_or_else(|| {
            MinvarError::InvalidRecord(format!("sample field has no GT value: {}", sample_field))
        })?;
        let ad = parts.get(indices.ad).ok_or_else(|| {
            MinvarError::InvalidRecord(format!("sample field has no AD value: {}", sample_field))
        })?;

        let genotype = gt
            .split(['/', '|'])
            .map(AlleleCall::parse)
            .collect::<MinvarResult<Vec<_>>>()?;

        let allele_depths = ad
            .split(',')
            .map(|tok| {
                if tok == "." {
                    Ok(None)
                } else {
                    tok.parse::<u32>().map(Some).map_err(|_| {
                        MinvarError::InvalidRecord(format!("invalid allele depth: {}", tok))
                    })
                }
            })
            .collect::<MinvarResult<Vec<_>>>()?;

        Ok(GenotypeData {
            genotype,
            allele_depths,
        })
    }

    /// Smallest recorded allele depth, None when every entry was "."
    pub fn min_recorded_depth(&self) -> Option<u32> {
        self.allele_depths.iter().flatten().copied().min()
    }

    /// True when the genotype names at least two distinct alleles
    pub fn is_heterozygous(&self) -> bool {
        self.genotype
            .iter()
            .any(|call| *call != self.genotype[0])
    }
}

/// One decoded variant-call line
#[derive(Debug, Clone)]
pub struct VariantRecord {
    /// 1-based genomic position
    pub position: u64,
    pub reference: String,
    pub alternates: Vec<String>,
    /// Per-sample data in header column order
    pub calls: Vec<GenotypeData>,
}

impl VariantRecord {
    pub fn from_line(line: &str) -> MinvarResult<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 10 {
            return Err(MinvarError::InvalidRecord(format!(
                "variant line has {} columns, expected at least 10",
                fields.len()
            )));
        }

        let position = fields[1].parse::<u64>().map_err(|_| {
            MinvarError::InvalidRecord(format!("invalid position: {}", fields[1]))
        })?;
        let reference = fields[3].to_string();
        let alternates: Vec<String> = fields[4].split(',').map(|s| s.to_string()).collect();

        let indices = FormatIndices::from_format(fields[8])?;
        let calls = fields[9..]
            .iter()
            .map(|f| GenotypeData::decode(f, &indices))
            .collect::<MinvarResult<Vec<_>>>()?;

        Ok(VariantRecord {
            position,
            reference,
            alternates,
            calls,
        })
    }

    /// Translate an allele-depth index into its allele symbol
    /// (0 = reference, k+1 = k-th alternate).
    pub fn symbol_at(&self, index: usize) -> MinvarResult<&str> {
        if index == 0 {
            Ok(&self.reference)
        } else {
            self.alternates.get(index - 1).map(|s| s.as_str()).ok_or_else(|| {
                MinvarError::InvalidRecord(format!(
                    "allele index {} out of range at position {}",
                    index, self.position
                ))
            })
        }
    }

    /// Translate a genotype allele call into its symbol; no-calls map to "N".
    pub fn symbol_of(&self, call: AlleleCall) -> MinvarResult<&str> {
        match call {
            AlleleCall::NoCall => Ok(NO_CALL_SYMBOL),
            AlleleCall::Called(index) => self.symbol_at(index),
        }
    }
}

/// Multi-sample VCF reader that handles both plain and gzip-compressed files.
/// Opening consumes the header; the sample names come from the "#CHROM" line.
pub struct VcfReader {
    reader: Box<dyn BufRead>,
    samples: Vec<String>,
}

impl VcfReader {
    pub fn open<P: AsRef<Path>>(path: P) -> MinvarResult<Self> {
        let file = File::open(&path)
            .map_err(|_| MinvarError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

        let mut reader: Box<dyn BufRead> = if is_gzipped(&path)? {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut samples = None;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break; // EOF
            }
            if line.starts_with("#CHROM") {
                let fields: Vec<&str> = line.split_whitespace().collect();
                let names = if fields.len() > 9 { &fields[9..] } else { &[] };
                samples = Some(names.iter().map(|s| s.to_string()).collect());
                break;
            }
            if !line.starts_with('#') && !line.trim().is_empty() {
                return Err(MinvarError::InvalidRecord(
                    "data line encountered before the #CHROM header line".to_string(),
                ));
            }
        }

        let samples = samples.ok_or_else(|| {
            MinvarError::InvalidRecord("no #CHROM header line found".to_string())
        })?;

        Ok(VcfReader { reader, samples })
    }

    /// Sample names from the header, in column order
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn records(&mut self) -> VariantRecordIterator {
        VariantRecordIterator {
            reader: &mut self.reader,
        }
    }
}

/// Iterator over decoded variant records
pub struct VariantRecordIterator<'a> {
    reader: &'a mut Box<dyn BufRead>,
}

impl<'a> Iterator for VariantRecordIterator<'a> {
    type Item = MinvarResult<VariantRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();

        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    let line = line.trim_end();
                    if line.starts_with('#') || line.is_empty() {
                        continue;
                    }
                    return Some(VariantRecord::from_line(line));
                }
                Err(e) => return Some(Err(MinvarError::Io(e))),
            }
        }
    }
}
