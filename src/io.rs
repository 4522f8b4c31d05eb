//! CSV loading of series and categories, and forecast artifact writing.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::Settings;
use crate::core::{clean_series_id, parse_observations, Series, SeriesStore};
use crate::error::{EsrnnError, Result};

/// Read the series-info file: one header line, then `id,category,...`
/// records. Returns the id-to-category map.
pub fn read_categories(path: &Path) -> Result<HashMap<String, String>> {
    let file = File::open(path)
        .map_err(|e| EsrnnError::Io(format!("{}: {e}", path.display())))?;
    let mut categories = HashMap::new();
    for line in BufReader::new(file).lines().skip(1) {
        let line = line?;
        let mut fields = line.split(',');
        let (Some(id), Some(category)) = (fields.next(), fields.next()) else {
            continue;
        };
        categories.insert(
            clean_series_id(id),
            category.trim_end_matches('\r').to_string(),
        );
    }
    debug!("read {} category records from {}", categories.len(), path.display());
    Ok(categories)
}

/// Load the training file: one header line, then `id,x1,x2,...` records.
///
/// Every record must resolve to a known category; an id missing from
/// the info file is fatal. Series too short for a single training
/// window are dropped; loading stops once the configured cap is full.
pub fn load_series(
    path: &Path,
    categories: &HashMap<String, String>,
    settings: &Settings,
) -> Result<SeriesStore> {
    let file = File::open(path)
        .map_err(|e| EsrnnError::Io(format!("{}: {e}", path.display())))?;
    let mut store = SeriesStore::new(settings.min_series_length(), settings.max_series_count);

    for line in BufReader::new(file).lines().skip(1) {
        let line = line?;
        let Some((raw_id, rest)) = line.split_once(',') else {
            continue;
        };
        let id = clean_series_id(raw_id);
        let category = categories
            .get(&id)
            .ok_or_else(|| EsrnnError::UnknownCategory(id.clone()))?;
        let vals = parse_observations(rest);
        let series = Series::new(
            id,
            category,
            vals,
            settings.holdback,
            settings.output_size,
            settings.max_series_length,
        )?;
        if !store.push(series) {
            break;
        }
    }
    info!("loaded {} usable series from {}", store.len(), path.display());
    Ok(store)
}

/// Artifact path of one repetition:
/// `{dir}/{variable}_{offset + rep}_LB{holdback}.csv`.
pub fn output_path(dir: &str, settings: &Settings, rep: usize) -> PathBuf {
    Path::new(dir).join(format!(
        "{}_{}_LB{}.csv",
        settings.variable,
        settings.big_loop_offset + rep,
        settings.holdback
    ))
}

/// Write one forecast line per series: `id,v1,...,vH`. Creates the
/// output directory if needed.
pub fn write_forecasts(path: &Path, store: &SeriesStore, forecasts: &[Vec<f64>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)
        .map_err(|e| EsrnnError::Io(format!("{}: {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    for (series, forecast) in store.iter().zip(forecasts.iter()) {
        write!(out, "{}", series.id())?;
        for v in forecast {
            write!(out, ",{v}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
