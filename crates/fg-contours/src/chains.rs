//! Chain-file sample source.
//!
//! Reads the whitespace-delimited chain layout used by nested-sampling
//! and MCMC toolchains: column 0 is the sample weight, column 1 is
//! reserved (a likelihood value), and named parameters start at column 2.
//! A sibling `.paramnames` file lists the parameter names in column
//! order, one per line, first token per line; a trailing `*` on a name is
//! decorative and stripped.

use std::path::Path;

use fg_core::{Error, Result};

/// Read `(samples, weights)` for the named parameters from a chain root.
///
/// `root` expands to `root.txt` (chain) and `root.paramnames` (names).
pub fn samples_from_chain_root(
    root: &str,
    params: &[&str],
) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    samples_from_chains(
        Path::new(&format!("{root}.txt")),
        Path::new(&format!("{root}.paramnames")),
        params,
    )
}

/// Read `(samples, weights)` for the named parameters from explicit files.
///
/// The returned sample matrix has one row per chain line with the
/// requested parameters in the requested order; weights come from
/// column 0. An empty chain file yields empty samples and weights.
pub fn samples_from_chains(
    chains_path: &Path,
    paramnames_path: &Path,
    params: &[&str],
) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
    let names = read_paramnames(paramnames_path)?;
    let columns: Vec<usize> = params
        .iter()
        .map(|p| {
            names
                .iter()
                .position(|n| n == p)
                .map(|i| 2 + i)
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "parameter {:?} not found in {}",
                        p,
                        paramnames_path.display(),
                    ))
                })
        })
        .collect::<Result<_>>()?;
    let needed = columns.iter().copied().max().unwrap_or(1) + 1;

    let text = std::fs::read_to_string(chains_path)?;
    let mut samples = Vec::new();
    let mut weights = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < needed {
            return Err(Error::Validation(format!(
                "{} line {}: {} columns but parameters require {}",
                chains_path.display(),
                lineno + 1,
                fields.len(),
                needed,
            )));
        }
        let parse = |idx: usize| -> Result<f64> {
            fields[idx].parse().map_err(|_| {
                Error::Validation(format!(
                    "{} line {}: column {} is not a number: {:?}",
                    chains_path.display(),
                    lineno + 1,
                    idx,
                    fields[idx],
                ))
            })
        };
        weights.push(parse(0)?);
        samples.push(columns.iter().map(|&c| parse(c)).collect::<Result<Vec<f64>>>()?);
    }
    Ok((samples, weights))
}

fn read_paramnames(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|name| name.trim_end_matches('*').to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let chains = dir.join("run.txt");
        let names = dir.join("run.paramnames");
        let mut f = std::fs::File::create(&chains).unwrap();
        writeln!(f, "0.5  -12.0  1.0  2.0  3.0").unwrap();
        writeln!(f, "1.0  -11.5  1.1  2.1  3.1").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "0.25 -13.0  0.9  1.9  2.9").unwrap();
        let mut f = std::fs::File::create(&names).unwrap();
        writeln!(f, "m*   \\mu").unwrap();
        writeln!(f, "c    c").unwrap();
        writeln!(f, "sigma \\sigma").unwrap();
        (chains, names)
    }

    #[test]
    fn test_reads_requested_columns_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (chains, names) = write_fixture(dir.path());
        let (samples, weights) =
            samples_from_chains(&chains, &names, &["sigma", "m"]).unwrap();
        assert_eq!(weights, vec![0.5, 1.0, 0.25]);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], vec![3.0, 1.0]);
        assert_eq!(samples[2], vec![2.9, 0.9]);
    }

    #[test]
    fn test_star_suffix_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let (chains, names) = write_fixture(dir.path());
        let (samples, _) = samples_from_chains(&chains, &names, &["m"]).unwrap();
        assert_eq!(samples[0], vec![1.0]);
    }

    #[test]
    fn test_unknown_parameter_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let (chains, names) = write_fixture(dir.path());
        let err = samples_from_chains(&chains, &names, &["nope"]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_empty_chain_file() {
        let dir = tempfile::tempdir().unwrap();
        let (_, names) = write_fixture(dir.path());
        let chains = dir.path().join("empty.txt");
        std::fs::File::create(&chains).unwrap();
        let (samples, weights) = samples_from_chains(&chains, &names, &["m"]).unwrap();
        assert!(samples.is_empty());
        assert!(weights.is_empty());
    }

    #[test]
    fn test_short_row_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_, names) = write_fixture(dir.path());
        let chains = dir.path().join("short.txt");
        std::fs::write(&chains, "0.5 -12.0 1.0\n").unwrap();
        let err = samples_from_chains(&chains, &names, &["sigma"]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_non_numeric_field_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_, names) = write_fixture(dir.path());
        let chains = dir.path().join("bad.txt");
        std::fs::write(&chains, "0.5 -12.0 oops 2.0 3.0\n").unwrap();
        let err = samples_from_chains(&chains, &names, &["m"]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_, names) = write_fixture(dir.path());
        let err =
            samples_from_chains(&dir.path().join("absent.txt"), &names, &["m"]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
