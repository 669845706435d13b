use crate::error::PortfolioError;
use crate::weights::CappedWeights;
use std::path::Path;
use tracing::debug;

/// Write `weights` to `path` as a pretty-printed `{ticker: weight}` object.
pub fn write_plan(path: &Path, weights: &CappedWeights) -> Result<(), PortfolioError> {
    let json = serde_json::to_string_pretty(weights)?;
    std::fs::write(path, json).map_err(|source| PortfolioError::Io {
        path: path.display().to_string(),
        source,
    })?;

    debug!("wrote plan of {} weights to {}", weights.len(), path.display());
    Ok(())
}

pub fn read_plan(path: &Path) -> Result<CappedWeights, PortfolioError> {
    let json = std::fs::read_to_string(path).map_err(|source| PortfolioError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::cap_weights;

    #[test]
    fn plan_survives_a_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        let weights = cap_weights([("A", 60.0), ("B", 20.0), ("C", 20.0)], 0.24).unwrap();

        write_plan(&path, &weights).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n"));
        assert!(text.contains("\"A\": 0.24"));
        let read = read_plan(&path).unwrap();
        assert_eq!(read.len(), 3);
        for (ticker, weight) in weights.iter() {
            assert!((read.get(ticker).unwrap() - weight).abs() < 1e-12);
        }
    }

    #[test]
    fn missing_plan_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let err = read_plan(&path).unwrap_err();
        assert!(matches!(err, PortfolioError::Io { .. }));
        assert!(err.to_string().contains("nope.json"));
    }
}
