use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, body).expect("write");
}

fn consolidator(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("consolidator");
    cmd.env("CONSOLIDATOR_HOME", home)
        .env_remove("CONSOLIDATOR_LOGS_DIR")
        .env_remove("CONSOLIDATOR_CONFIG_PATH")
        .env_remove("CONSOLIDATOR_STAGING_ROOT");
    cmd
}

#[test]
fn resolve_prints_paths_and_flags_missing_sources() {
    let tmp = tempdir().expect("tempdir");
    let support = tmp.path().join("soportes");
    let package = tmp.path().join("facturas");
    fs::create_dir_all(support.join("FE31")).expect("mkdir");
    fs::create_dir_all(&package).expect("mkdir");

    consolidator(&tmp.path().join("home"))
        .arg("resolve")
        .args(["--key", "31"])
        .arg("--support-root")
        .arg(&support)
        .arg("--package-root")
        .arg(&package)
        .arg("--output-root")
        .arg(tmp.path().join("salida"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("support_exists=true"))
        .stdout(predicate::str::contains("package_exists=false"))
        .stdout(predicate::str::contains("AttachedDocument_F-010-31"))
        .stdout(predicate::str::contains("FE31.zip"));
}

#[test]
fn resolve_rejects_keys_with_separators() {
    let tmp = tempdir().expect("tempdir");
    consolidator(&tmp.path().join("home"))
        .args(["resolve", "--key", "../31"])
        .args(["--support-root", "/s", "--package-root", "/p", "--output-root", "/o"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid invoice key"));
}

#[test]
fn normalize_command_promotes_and_purges() {
    let tmp = tempdir().expect("tempdir");
    let unit = tmp.path().join("FE12");
    write(&unit.join("ResultadosMSPS_FE12_3_A_CUV.txt"), "cuv");
    write(&unit.join("ResultadosLocales_FE12.txt"), "local");

    consolidator(&tmp.path().join("home"))
        .arg("normalize")
        .arg("--dir")
        .arg(&unit)
        .args(["--key", "12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("promoted"));

    assert!(unit.join("ResultadosMSPS_FE12_3_A_CUV.json").exists());
    assert!(!unit.join("ResultadosLocales_FE12.txt").exists());
}

#[test]
fn classify_moves_units_into_buckets() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("resultados");
    write(&root.join("FE1/FE1.xml"), "x");
    write(&root.join("FE1/ResultadosMSPS_FE1_9_A_CUV.txt"), "ok");
    write(&root.join("FE2/FE2.xml"), "x");
    write(&root.join("FE2/FE2.json"), "{}");
    write(&root.join("FE2/ResultadosLocales_FE2.txt"), "l");
    write(&root.join("FE3/FE3.xml"), "x");
    write(&root.join("FE3/FE3.json"), "{}");
    write(&root.join("FE3/ResultadosLocales_FE3.txt"), "l");
    write(&root.join("FE3/ResultadosMSPS_FE3_ID0_R.txt"), "r");
    write(&root.join("FE4/otro.pdf"), "p");

    consolidator(&tmp.path().join("home"))
        .arg("classify")
        .arg("--root")
        .arg(&root)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("FE1 -> validados y aprobados (dry run)"));
    assert!(root.join("FE1").exists());

    consolidator(&tmp.path().join("home"))
        .arg("classify")
        .arg("--root")
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains("moved=3"));

    assert!(root.join("validados y aprobados/FE1").is_dir());
    assert!(root.join("Rechazados Locales/FE2").is_dir());
    assert!(root.join("Rechazados MSPS/FE3").is_dir());
    assert!(root.join("FE4").is_dir());
}

#[test]
fn rename_archives_bumps_suffixes_without_clobbering() {
    let tmp = tempdir().expect("tempdir");
    let root = tmp.path().join("salida");
    write(&root.join("FE258058.zip"), "first");
    write(&root.join("FE258058_1.zip"), "second");
    write(&root.join("FE77.zip"), "other");
    write(&root.join("facturas_no_encontradas.csv"), "Factura,Motivo\n");

    consolidator(&tmp.path().join("home"))
        .arg("rename-archives")
        .arg("--root")
        .arg(&root)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("FE77.zip -> FE77_1.zip (dry run)"));
    assert!(root.join("FE77.zip").exists());

    consolidator(&tmp.path().join("home"))
        .arg("rename-archives")
        .arg("--root")
        .arg(&root)
        .assert()
        .success()
        .stdout(predicate::str::contains("renamed=3"));

    assert_eq!(fs::read_to_string(root.join("FE258058_1.zip")).expect("read"), "first");
    assert_eq!(fs::read_to_string(root.join("FE258058_2.zip")).expect("read"), "second");
    assert!(root.join("FE77_1.zip").exists());
    assert!(!root.join("FE258058.zip").exists());
    assert!(root.join("facturas_no_encontradas.csv").exists());
}

#[test]
fn status_flags_unknown_variables_and_reads_config() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path().join("home");
    write(
        &home.join("consolidator.toml"),
        "[report]\nmode = \"replace\"\n",
    );

    consolidator(&home)
        .env("CONSOLIDATOR_SUPORT_ROOT", "/typo")
        .arg("status")
        .assert()
        .failure()
        .stdout(predicate::str::contains("report_mode=replace"))
        .stdout(predicate::str::contains("last_run=none"))
        .stdout(predicate::str::contains(
            "unknown environment variable CONSOLIDATOR_SUPORT_ROOT",
        ));
}

#[test]
fn status_json_is_machine_readable() {
    let tmp = tempdir().expect("tempdir");
    let output = consolidator(&tmp.path().join("home"))
        .args(["status", "--json"])
        .output()
        .expect("run status");
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(parsed["command"], "status");
    assert!(parsed["details"].as_array().is_some());
}
