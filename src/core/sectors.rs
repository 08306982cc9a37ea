//! Sector registry

use crate::core::model::Sector;
use crate::core::repository::Repository;
use anyhow::{Result, bail};
use tracing::info;

pub const DEFAULT_SECTOR_COLOR: &str = "#9e9e9e";

const DEFAULT_SECTORS: [(&str, &str, &str); 13] = [
    ("AI", "AI/반도체", "#7c4dff"),
    ("BIGTECH", "빅테크", "#1e88e5"),
    ("ROBOT", "로봇", "#00bcd4"),
    ("BIO", "바이오", "#66bb6a"),
    ("POWER", "전력/에너지", "#ffa726"),
    ("OPTICAL", "광학", "#ec407a"),
    ("SPACE", "우주/항공", "#5c6bc0"),
    ("DEFENSE", "방산", "#78909c"),
    ("BATTERY", "2차전지", "#26c6da"),
    ("CRYPTO", "크립토", "#ffca28"),
    ("HEDGE", "헷지", "#9c27b0"),
    ("VENTURE", "벤처", "#ff7043"),
    ("ETC", "기타", "#8d6e63"),
];

pub fn default_sectors() -> Vec<Sector> {
    DEFAULT_SECTORS
        .iter()
        .zip(1..)
        .map(|((code, name, color), sort_order)| Sector {
            code: code.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            sort_order,
        })
        .collect()
}

/// Returns the registry ordered by `sort_order`, seeding the defaults when it is empty.
pub async fn load_or_seed(repo: &dyn Repository) -> Result<Vec<Sector>> {
    let sectors = repo.load_sectors().await?;
    if !sectors.is_empty() {
        return Ok(sectors);
    }

    info!("Seeding default sectors");
    for sector in default_sectors() {
        repo.upsert_sector(&sector).await?;
    }
    repo.load_sectors().await
}

/// Appends a sector after the current last one. The code is stored upper-cased.
pub async fn add_sector(
    repo: &dyn Repository,
    code: &str,
    name: &str,
    color: Option<&str>,
) -> Result<Sector> {
    let code = code.trim().to_uppercase();
    if code.is_empty() || name.trim().is_empty() {
        bail!("Sector code and name are required");
    }

    let existing = load_or_seed(repo).await?;
    if existing.iter().any(|s| s.code == code) {
        bail!("Sector {code} already exists");
    }

    let sector = Sector {
        code,
        name: name.trim().to_string(),
        color: color.unwrap_or(DEFAULT_SECTOR_COLOR).to_string(),
        sort_order: existing.iter().map(|s| s.sort_order).max().unwrap_or(0) + 1,
    };
    repo.upsert_sector(&sector).await?;
    Ok(sector)
}

/// Display name for a sector code, falling back to the code itself.
pub fn sector_name<'a>(sectors: &'a [Sector], code: &'a str) -> &'a str {
    sectors
        .iter()
        .find(|s| s.code == code)
        .map(|s| s.name.as_str())
        .unwrap_or(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRepository;

    #[tokio::test]
    async fn test_seeds_defaults_once() {
        let repo = MemoryRepository::new();
        let sectors = load_or_seed(&repo).await.unwrap();
        assert_eq!(sectors.len(), 13);
        assert_eq!(sectors[0].code, "AI");
        assert_eq!(sectors[12].code, "ETC");
        assert_eq!(sectors[12].sort_order, 13);

        repo.upsert_sector(&Sector {
            code: "AI".to_string(),
            name: "Artificial Intelligence".to_string(),
            color: "#000000".to_string(),
            sort_order: 1,
        })
        .await
        .unwrap();
        let sectors = load_or_seed(&repo).await.unwrap();
        assert_eq!(sectors[0].name, "Artificial Intelligence");
    }

    #[tokio::test]
    async fn test_add_sector_appends_upper_cased() {
        let repo = MemoryRepository::new();
        let sector = add_sector(&repo, "quantum", "Quantum", None).await.unwrap();
        assert_eq!(sector.code, "QUANTUM");
        assert_eq!(sector.color, DEFAULT_SECTOR_COLOR);
        assert_eq!(sector.sort_order, 14);

        assert!(add_sector(&repo, "Quantum", "Again", None).await.is_err());
        assert!(add_sector(&repo, " ", "Blank", None).await.is_err());
    }

    #[test]
    fn test_sector_name_falls_back_to_code() {
        let sectors = default_sectors();
        assert_eq!(sector_name(&sectors, "BIO"), "바이오");
        assert_eq!(sector_name(&sectors, "UNKNOWN"), "UNKNOWN");
    }
}
