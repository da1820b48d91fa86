//! Scenarios for file-backed catalogs in scratch directories.

use std::{fs, path::Path};

use tempfile::TempDir;
use tundra_core::{Error as CoreError, OrderKey, Value};

use crate::{Catalog, CatalogConfig, Error};

const COUNTRIES: &str = r#"[
  {"id": 1, "name": "Austria", "continent": "EU", "density": 107},
  {"id": 2, "name": "France",  "continent": "EU", "density": 116},
  {"id": 3, "name": "Peru",    "continent": "SA", "density": 25.5}
]"#;

const CARS: &str = r#"
[[records]]
code = "vw"
name = "Beetle"
built = 1938-01-01

[[records]]
code = "citroen"
name = "2CV"
built = 1948-10-07
"#;

fn config_for(dir: &Path, extra: &str) -> CatalogConfig {
  let text = format!(
    r#"
      base_path = "{base}"

      [[record_types]]
      name = "countries"
      {extra}

      [record_types.default_attributes]
      contemporary = true

      [[record_types.indexes]]
      attribute = "name"
      unique = true

      [[record_types.indexes]]
      attribute = "continent"

      [[record_types]]
      name = "cars"
      format = "toml"
      primary_key = "code"
    "#,
    base = dir.display(),
  );
  CatalogConfig::from_toml(&text).unwrap()
}

fn scratch() -> TempDir {
  let dir = tempfile::tempdir().unwrap();
  fs::write(dir.path().join("countries.json"), COUNTRIES).unwrap();
  fs::write(dir.path().join("cars.toml"), CARS).unwrap();
  dir
}

// ─── Queries over files ──────────────────────────────────────────────────────

#[test]
fn country_round_trip_from_json() {
  let dir = scratch();
  let catalog = Catalog::from_config(&config_for(dir.path(), "")).unwrap();
  let countries = catalog.get("countries").unwrap();

  assert_eq!(countries.find_by([("name", "France")]).unwrap().unwrap().id(), &Value::Int(2));
  assert_eq!(countries.all().filter([("continent", "EU")]).count().unwrap(), 2);
  assert_eq!(
    countries.all().filter([("continent", "EU")]).order(["name"]).pluck_column("name").unwrap(),
    [Value::from("Austria"), Value::from("France")]
  );
  assert_eq!(countries.all().filter([("id", vec![1, 2])]).count().unwrap(), 2);
  assert!(countries.find(42).unwrap_err().is_not_found());
  assert_eq!(countries.find(1).unwrap().get_bool("contemporary"), Some(true));
}

#[test]
fn toml_records_with_custom_primary_key() {
  let dir = scratch();
  let catalog = Catalog::from_config(&config_for(dir.path(), "")).unwrap();
  let cars = catalog.get("cars").unwrap();

  let beetle = cars.find("vw").unwrap();
  assert_eq!(beetle.get_str("name"), Some("Beetle"));
  assert!(beetle.get_date("built").is_some());
  assert_eq!(cars.all().order(["built"]).ids().unwrap(), [Value::from("vw"), Value::from("citroen")]);
}

#[test]
fn names_keep_declaration_order() {
  let dir = scratch();
  let catalog = Catalog::from_config(&config_for(dir.path(), "")).unwrap();
  let names: Vec<&str> = catalog.names().map(|n| &**n).collect();
  assert_eq!(names, ["countries", "cars"]);
  assert!(matches!(catalog.get("planets"), Err(Error::UnknownRecordType(_))));
}

#[test]
fn eager_load_surfaces_the_first_failure() {
  let dir = scratch();
  fs::write(dir.path().join("cars.toml"), "records = [1]").unwrap();
  let catalog = Catalog::from_config(&config_for(dir.path(), "")).unwrap();
  let err = catalog.eager_load().unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Load { .. })));
  assert!(catalog.get("countries").unwrap().is_loaded());
}

#[test]
fn duplicate_unique_key_in_file() {
  let dir = scratch();
  fs::write(
    dir.path().join("countries.json"),
    r#"[{"id": 1, "name": "Austria"}, {"id": 2, "name": "Austria"}]"#,
  )
  .unwrap();
  let catalog = Catalog::from_config(&config_for(dir.path(), "")).unwrap();
  let err = catalog.get("countries").unwrap().generation().unwrap_err();
  assert!(matches!(err, CoreError::NotUnique { .. }));
}

#[test]
fn missing_base_path_is_a_configuration_error() {
  let config = CatalogConfig::from_toml("[[record_types]]\nname = \"countries\"").unwrap();
  let catalog = Catalog::from_config(&config).unwrap();
  let err = catalog.get("countries").unwrap().generation().unwrap_err();
  assert!(matches!(err, CoreError::Configuration { .. }));
}

#[test]
fn duplicate_record_type_names_are_rejected() {
  let config = CatalogConfig::from_toml(
    "[[record_types]]\nname = \"countries\"\n[[record_types]]\nname = \"countries\"",
  )
  .unwrap();
  assert!(matches!(Catalog::from_config(&config), Err(Error::DuplicateRecordType(_))));
}

#[test]
fn yaml_records_share_anchored_values() {
  let dir = tempfile::tempdir().unwrap();
  fs::write(
    dir.path().join("currencies.yml"),
    "
- id: 1
  code: EUR
  zone: &eurozone [AT, FR]
- id: 2
  code: XPF
  zone: [PF]
- id: 3
  code: EUR-cash
  zone: *eurozone
",
  )
  .unwrap();
  let text = format!(
    "base_path = \"{}\"\n[[record_types]]\nname = \"currencies\"\nformat = \"yaml\"\n\
     [[record_types.indexes]]\nattribute = \"code\"\nunique = true\n",
    dir.path().display()
  );
  let catalog = Catalog::from_config(&CatalogConfig::from_toml(&text).unwrap()).unwrap();
  let currencies = catalog.get("currencies").unwrap();

  assert_eq!(currencies.find_by([("code", "XPF")]).unwrap().unwrap().id(), &Value::Int(2));
  let first = currencies.find(1).unwrap();
  let third = currencies.find(3).unwrap();
  assert!(first.get("zone").unwrap().ptr_eq(third.get("zone").unwrap()));
}

#[test]
fn csv_records_are_text_keyed_by_position_order() {
  let dir = tempfile::tempdir().unwrap();
  fs::write(
    dir.path().join("airports.csv"),
    "id,code,country\nvie,VIE,Austria\ncdg,CDG,France\nory,ORY,France\n",
  )
  .unwrap();
  let text = format!(
    "base_path = \"{}\"\n[[record_types]]\nname = \"airports\"\nformat = \"csv\"\n\
     [[record_types.indexes]]\nattribute = \"country\"\n",
    dir.path().display()
  );
  let catalog = Catalog::from_config(&CatalogConfig::from_toml(&text).unwrap()).unwrap();
  let airports = catalog.get("airports").unwrap();

  assert_eq!(airports.find("cdg").unwrap().get_i64("position"), Some(1));
  assert_eq!(
    airports
      .all()
      .filter([("country", "France")])
      .order([OrderKey::desc("position")])
      .pluck_column("code")
      .unwrap(),
    [Value::from("ORY"), Value::from("CDG")]
  );
}

// ─── Reload ──────────────────────────────────────────────────────────────────

#[test]
fn digest_auto_reload_follows_file_content() {
  let dir = scratch();
  let catalog = Catalog::from_config(&config_for(
    dir.path(),
    "auto_reload = true\nchange_detection = \"digest\"",
  ))
  .unwrap();
  let countries = catalog.get("countries").unwrap();

  let before = countries.find(1).unwrap();
  assert!(before.ptr_eq(&countries.find(1).unwrap()));

  fs::write(
    dir.path().join("countries.json"),
    r#"[{"id": 1, "name": "Austria", "continent": "EU"}]"#,
  )
  .unwrap();
  let after = countries.find(1).unwrap();
  assert!(!before.ptr_eq(&after));
  assert_eq!(countries.all().count().unwrap(), 1);
}

#[test]
fn without_auto_reload_file_changes_are_ignored() {
  let dir = scratch();
  let catalog = Catalog::from_config(&config_for(dir.path(), "")).unwrap();
  let countries = catalog.get("countries").unwrap();
  let before = countries.find(1).unwrap();

  fs::write(dir.path().join("countries.json"), "[]").unwrap();
  assert!(before.ptr_eq(&countries.find(1).unwrap()));
  assert_eq!(countries.reload().unwrap().records().len(), 0);
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[test]
fn fixture_overrides_and_restores() {
  let dir = scratch();
  let fixtures = tempfile::tempdir().unwrap();
  fs::write(
    fixtures.path().join("countries.json"),
    r#"[{"id": 9, "name": "Fixtureland", "continent": "EU"}]"#,
  )
  .unwrap();

  let catalog = Catalog::from_config(&config_for(dir.path(), "")).unwrap();
  let countries = catalog.get("countries").unwrap();
  assert_eq!(countries.all().count().unwrap(), 3);

  catalog.load_fixture("countries", fixtures.path()).unwrap();
  assert!(catalog.has_fixture("countries").unwrap());
  assert_eq!(countries.all().ids().unwrap(), [Value::Int(9)]);

  // Repeat calls are ignored until unloaded.
  catalog.load_fixture("countries", dir.path()).unwrap();
  assert_eq!(countries.all().ids().unwrap(), [Value::Int(9)]);

  catalog.unload_fixtures().unwrap();
  assert!(!catalog.has_fixture("countries").unwrap());
  assert_eq!(countries.all().count().unwrap(), 3);
}

#[test]
fn failed_fixture_leaves_the_original_in_place() {
  let dir = scratch();
  let empty = tempfile::tempdir().unwrap();
  let catalog = Catalog::from_config(&config_for(dir.path(), "")).unwrap();

  assert!(catalog.load_fixture("countries", empty.path()).is_err());
  assert!(!catalog.has_fixture("countries").unwrap());
  assert_eq!(catalog.get("countries").unwrap().all().count().unwrap(), 3);
}

#[test]
fn unloading_when_the_original_file_is_gone_keeps_fixture_data() {
  let dir = scratch();
  let fixtures = tempfile::tempdir().unwrap();
  fs::write(fixtures.path().join("cars.toml"), CARS).unwrap();

  let catalog = Catalog::from_config(&config_for(dir.path(), "")).unwrap();
  catalog.load_fixture("cars", fixtures.path()).unwrap();
  fs::remove_file(dir.path().join("cars.toml")).unwrap();

  catalog.unload_fixture("cars").unwrap();
  assert!(!catalog.has_fixture("cars").unwrap());
  assert_eq!(catalog.get("cars").unwrap().all().count().unwrap(), 2);
}
