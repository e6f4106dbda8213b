//! Unit tests for configuration loading and validation.

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use capacity_hunter::config::{ConfigError, ProvisionConfig};
use capacity_hunter::ssh_key::SshKeyError;
use capacity_hunter::test_support::EnvGuard;
use rstest::*;
use tempfile::TempDir;

#[fixture]
fn valid_config() -> ProvisionConfig {
    ProvisionConfig {
        compartment_id: String::from("ocid1.compartment.oc1..example"),
        availability_domain: String::from("Uocm:EU-FRANKFURT-1-AD-1"),
        image_id: String::from("ocid1.image.oc1..ubuntu"),
        subnet_id: String::from("ocid1.subnet.oc1..public"),
        ssh_public_key_file: String::from("~/.ssh/id_ed25519.pub"),
        shape: String::from("VM.Standard.A1.Flex"),
        display_name: String::from("capacity-hunter"),
        boot_volume_size_gb: 100,
        oci_bin: String::from("oci"),
        oci_profile: None,
        ip_file: String::from("/tmp/server_ip.txt"),
        record_file: String::from("/tmp/infra_ids.txt"),
        deploy_hint: String::from("bash scripts/push-to-server.sh"),
        strict_readiness: false,
    }
}

#[rstest]
#[case::compartment(|cfg: &mut ProvisionConfig| cfg.compartment_id.clear(), "CAPACITY_HUNTER_COMPARTMENT_ID", "compartment_id")]
#[case::availability_domain(|cfg: &mut ProvisionConfig| cfg.availability_domain.clear(), "CAPACITY_HUNTER_AVAILABILITY_DOMAIN", "availability_domain")]
#[case::image(|cfg: &mut ProvisionConfig| cfg.image_id.clear(), "CAPACITY_HUNTER_IMAGE_ID", "image_id")]
#[case::subnet(|cfg: &mut ProvisionConfig| cfg.subnet_id = String::from("  "), "CAPACITY_HUNTER_SUBNET_ID", "subnet_id")]
#[case::ssh_key(|cfg: &mut ProvisionConfig| cfg.ssh_public_key_file.clear(), "CAPACITY_HUNTER_SSH_PUBLIC_KEY_FILE", "ssh_public_key_file")]
#[case::shape(|cfg: &mut ProvisionConfig| cfg.shape.clear(), "CAPACITY_HUNTER_SHAPE", "shape")]
#[case::display_name(|cfg: &mut ProvisionConfig| cfg.display_name.clear(), "CAPACITY_HUNTER_DISPLAY_NAME", "display_name")]
fn validation_errors_are_actionable(
    valid_config: ProvisionConfig,
    #[case] mutate: fn(&mut ProvisionConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_config;
    mutate(&mut cfg);

    let error = cfg.validate().expect_err("validation should fail");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error, got {error:?}");
    };
    assert!(
        message.contains(env_var),
        "error should mention env var {env_var}: {message}"
    );
    assert!(
        message.contains(toml_key),
        "error should mention TOML key {toml_key}: {message}"
    );
    assert!(
        message.contains("capacity-hunter.toml"),
        "error should mention config file: {message}"
    );
}

#[rstest]
fn zero_boot_volume_is_rejected(valid_config: ProvisionConfig) {
    let cfg = ProvisionConfig {
        boot_volume_size_gb: 0,
        ..valid_config
    };
    assert_eq!(cfg.validate(), Err(ConfigError::InvalidBootVolume));
}

#[rstest]
fn provision_context_reads_key_material(valid_config: ProvisionConfig) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    Dir::open_ambient_dir(&root, ambient_authority())
        .unwrap_or_else(|err| panic!("open temp dir: {err}"))
        .write("oracle.pub", "ssh-ed25519 AAAAC3Nz operator@laptop\n")
        .unwrap_or_else(|err| panic!("write key: {err}"));
    let cfg = ProvisionConfig {
        ssh_public_key_file: root.join("oracle.pub").into_string(),
        ..valid_config
    };

    let context = cfg
        .provision_context()
        .unwrap_or_else(|err| panic!("context: {err}"));

    assert_eq!(context.ssh_public_key, "ssh-ed25519 AAAAC3Nz operator@laptop");
    assert_eq!(context.compartment_id, cfg.compartment_id);
    assert_eq!(context.shape, "VM.Standard.A1.Flex");
    assert_eq!(context.boot_volume_size_gb, 100);
    context
        .validate()
        .unwrap_or_else(|err| panic!("context from config validates: {err}"));
}

#[rstest]
fn provision_context_surfaces_missing_key(valid_config: ProvisionConfig) {
    let cfg = ProvisionConfig {
        ssh_public_key_file: String::from("/nonexistent/oracle.pub"),
        ..valid_config
    };

    let err = cfg.provision_context().expect_err("missing key should fail");

    assert!(
        matches!(err, ConfigError::SshKey(SshKeyError::FileRead { .. })),
        "unexpected error: {err:?}"
    );
}

#[rstest]
#[case(None, None)]
#[case(Some("  "), None)]
#[case(Some("FRANKFURT"), Some("FRANKFURT"))]
fn blank_oci_profile_falls_back_to_cli_default(
    valid_config: ProvisionConfig,
    #[case] configured: Option<&str>,
    #[case] expected: Option<&str>,
) {
    let cfg = ProvisionConfig {
        oci_profile: configured.map(str::to_owned),
        ..valid_config
    };
    assert_eq!(cfg.oci_cli_config().profile.as_deref(), expected);
    assert_eq!(cfg.oci_cli_config().oci_bin, "oci");
}

#[rstest]
fn result_store_uses_configured_paths(valid_config: ProvisionConfig) {
    let store = valid_config.result_store();
    assert_eq!(store.ip_file().as_str(), "/tmp/server_ip.txt");
    assert_eq!(store.record_file().as_str(), "/tmp/infra_ids.txt");
}

#[tokio::test]
async fn environment_overrides_defaults() {
    let _guard = EnvGuard::set_vars(&[
        ("CAPACITY_HUNTER_COMPARTMENT_ID", "ocid1.compartment.oc1..env"),
        ("CAPACITY_HUNTER_AVAILABILITY_DOMAIN", "Uocm:US-ASHBURN-AD-2"),
        ("CAPACITY_HUNTER_IMAGE_ID", "ocid1.image.oc1..env"),
        ("CAPACITY_HUNTER_SUBNET_ID", "ocid1.subnet.oc1..env"),
        ("CAPACITY_HUNTER_DISPLAY_NAME", "arm-box"),
    ])
    .await;

    let cfg = ProvisionConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("load config: {err}"));

    assert_eq!(cfg.compartment_id, "ocid1.compartment.oc1..env");
    assert_eq!(cfg.availability_domain, "Uocm:US-ASHBURN-AD-2");
    assert_eq!(cfg.display_name, "arm-box");
    assert_eq!(cfg.shape, "VM.Standard.A1.Flex");
    assert_eq!(cfg.boot_volume_size_gb, 100);
    assert!(!cfg.strict_readiness);
    cfg.validate()
        .unwrap_or_else(|err| panic!("env config validates: {err}"));
}
