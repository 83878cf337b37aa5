//! Seed the catalog from a YAML (or JSON) file.
//!
//! ```yaml
//! products:
//!   - name: Desk Lamp
//!     price: "39.00"
//!     category: Home
//!     brand: Lumo
//!     sku: LUMO-DL-01
//!     stock: 25
//!     image_urls: ["/uploads/lamp.jpg"]
//! ```
//!
//! Every product is validated before anything is written. Each entry must
//! carry a SKU, unique within the file; products whose SKU already exists
//! are skipped, so the command can be re-run.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, warn};

use emporium_api::db::{ProductRepository, RepositoryError};
use emporium_api::models::NewProduct;

use super::{CommandError, connect};

/// Contents of a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub products: Vec<NewProduct>,
}

/// Outcome of a seeding run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub inserted: usize,
    pub skipped: usize,
}

/// Parse seed file contents. `.json` files are read as JSON, anything else
/// as YAML.
///
/// # Errors
///
/// Returns `CommandError::SeedFormat` if the contents do not parse.
pub fn parse(path: &Path, content: &str) -> Result<SeedFile, CommandError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(content).map_err(|e| CommandError::SeedFormat(e.to_string()))
    } else {
        serde_yaml::from_str(content).map_err(|e| CommandError::SeedFormat(e.to_string()))
    }
}

/// Validate every product, collecting one message per invalid entry.
///
/// Beyond the usual product rules, seed entries need a SKU: it is the key
/// that makes re-running a seed skip what is already there.
///
/// # Errors
///
/// Returns the list of problems, each prefixed with the entry's position
/// and name.
pub fn validate(file: SeedFile) -> Result<Vec<NewProduct>, Vec<String>> {
    let mut valid = Vec::with_capacity(file.products.len());
    let mut errors = Vec::new();
    let mut skus = HashSet::new();

    for (index, product) in file.products.into_iter().enumerate() {
        let label = format!("#{} ({})", index + 1, product.name);
        match product.validate() {
            Ok(product) => match product.sku.clone() {
                None => errors.push(format!("{label}: SKU is required for seeding")),
                Some(sku) if !skus.insert(sku.clone()) => {
                    errors.push(format!("{label}: SKU {sku} appears more than once"));
                }
                Some(_) => valid.push(product),
            },
            Err(msg) => errors.push(format!("{label}: {msg}")),
        }
    }

    if errors.is_empty() { Ok(valid) } else { Err(errors) }
}

/// Seed products from `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any product is
/// invalid, or the database fails.
pub async fn products(file_path: &str) -> Result<SeedSummary, CommandError> {
    let path = Path::new(file_path);
    info!(path = %file_path, "Loading products from file");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CommandError::Read {
            path: file_path.to_string(),
            source,
        })?;

    // Validate before connecting to the database
    let products = validate(parse(path, &content)?).map_err(|errors| {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        CommandError::Invalid(format!("{} invalid product(s)", errors.len()))
    })?;
    info!(products = products.len(), "Seed file validated");

    let pool = connect().await?;
    let repo = ProductRepository::new(&pool);
    let mut summary = SeedSummary::default();

    for product in &products {
        match repo.create(product).await {
            Ok(created) => {
                info!(product_id = %created.id, name = %created.name, "Inserted");
                summary.inserted += 1;
            }
            Err(RepositoryError::Conflict(what)) => {
                warn!(name = %product.name, %what, "Skipped");
                summary.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!("Seeding complete!");
    info!("  Products inserted: {}", summary.inserted);
    info!("  Products skipped (already exist): {}", summary.skipped);
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const YAML: &str = r#"
products:
  - name: Desk Lamp
    price: "39.00"
    category: Home
    brand: Lumo
    sku: LUMO-DL-01
    stock: 25
  - name: "  Notebook  "
    price: "4.50"
    sku: " NB-A5 "
"#;

    #[test]
    fn test_parse_yaml() {
        let file = parse(Path::new("products.yaml"), YAML).unwrap();
        assert_eq!(file.products.len(), 2);
        assert_eq!(file.products[0].sku.as_deref(), Some("LUMO-DL-01"));
        assert!(file.products[1].is_active);
    }

    #[test]
    fn test_parse_json_by_extension() {
        let json = r#"{"products":[{"name":"Mug","price":"12.00"}]}"#;
        let file = parse(Path::new("seed.JSON"), json).unwrap();
        assert_eq!(file.products[0].name, "Mug");
    }

    #[test]
    fn test_parse_rejects_missing_products() {
        let err = parse(Path::new("seed.yaml"), "items: []").unwrap_err();
        assert!(matches!(err, CommandError::SeedFormat(_)));
    }

    #[test]
    fn test_validate_trims_and_reports_each_bad_entry() {
        let file = parse(Path::new("products.yaml"), YAML).unwrap();
        let products = validate(file).unwrap();
        assert_eq!(products[1].name, "Notebook");
        assert_eq!(products[1].sku.as_deref(), Some("NB-A5"));

        let bad = r#"
products:
  - name: Fine
    price: "1.00"
    sku: FINE-1
  - name: Negative
    price: "-1"
    sku: NEG-1
  - name: ""
    price: "2.00"
    sku: EMPTY-1
"#;
        let errors = validate(parse(Path::new("bad.yaml"), bad).unwrap()).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("#2 (Negative)"));
        assert!(errors[1].starts_with("#3 ()"));
    }

    #[test]
    fn test_validate_requires_unique_sku() {
        let file = r#"
products:
  - name: Mug
    price: "12.00"
    sku: MUG-1
  - name: Teapot
    price: "30.00"
  - name: Blank Sku
    price: "3.00"
    sku: "   "
  - name: Mug Again
    price: "12.00"
    sku: MUG-1
"#;
        let errors = validate(parse(Path::new("seed.yaml"), file).unwrap()).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "#2 (Teapot): SKU is required for seeding".to_string(),
                "#3 (Blank Sku): SKU is required for seeding".to_string(),
                "#4 (Mug Again): SKU MUG-1 appears more than once".to_string(),
            ]
        );
    }
}
