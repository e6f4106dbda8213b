//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use predicates::prelude::*;
use rstest::rstest;
use tempfile::TempDir;

const FAKE_OCI: &str = r#"#!/bin/sh
case " $* " in
  *" --no-retry "*) ;;
  *)
    echo "expected --no-retry: $*" >&2
    exit 3 ;;
esac
case "$1 $2 $3" in
  "compute instance launch")
    echo '{"data":{"id":"ocid1.instance.oc1..smoke","lifecycle-state":"PROVISIONING"}}' ;;
  "compute instance get")
    echo '{"data":{"id":"ocid1.instance.oc1..smoke","lifecycle-state":"RUNNING"}}' ;;
  "compute vnic-attachment list")
    echo '{"data":[{"id":"ocid1.vnicattachment.smoke","vnic-id":"ocid1.vnic.smoke"}]}' ;;
  "network vnic get")
    echo '{"data":{"public-ip":"203.0.113.7"}}' ;;
  *)
    echo "unexpected arguments: $*" >&2
    exit 2 ;;
esac
"#;

struct Sandbox {
    _tmp: TempDir,
    root: Utf8PathBuf,
    dir: Dir,
}

impl Sandbox {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
        let dir = Dir::open_ambient_dir(&root, ambient_authority())
            .unwrap_or_else(|err| panic!("open temp dir: {err}"));
        Self {
            _tmp: tmp,
            root,
            dir,
        }
    }

    fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        self.dir
            .write(name, contents)
            .unwrap_or_else(|err| panic!("write {name}: {err}"));
        self.root.join(name)
    }

    fn read(&self, name: &str) -> String {
        self.dir
            .read_to_string(name)
            .unwrap_or_else(|err| panic!("read {name}: {err}"))
    }

    fn command(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("capacity-hunter");
        cmd.env_clear()
            .env("HOME", self.root.as_str())
            .env("XDG_CONFIG_HOME", self.root.join("xdg").as_str())
            .current_dir(self.root.as_std_path());
        cmd
    }
}

#[cfg(unix)]
fn make_executable(path: &Utf8Path) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .unwrap_or_else(|err| panic!("chmod {path}: {err}"));
}

#[test]
fn help_lists_budget_flags() {
    let mut cmd = cargo_bin_cmd!("capacity-hunter");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--hours"))
        .stdout(predicate::str::contains("--interval"));
}

#[rstest]
#[case(&["--interval", "0"])]
#[case(&["--hours", "0"])]
#[case(&["--hours", "abc"])]
#[case(&["--hours=-1"])]
#[case(&["--bogus"])]
fn invalid_arguments_exit_with_usage_error(#[case] args: &[&str]) {
    let mut cmd = cargo_bin_cmd!("capacity-hunter");
    cmd.args(args).assert().code(2);
}

#[test]
fn missing_configuration_is_reported() {
    let sandbox = Sandbox::new();

    sandbox
        .command()
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CAPACITY_HUNTER_COMPARTMENT_ID"))
        .stderr(predicate::str::contains("capacity-hunter.toml"));
}

#[test]
fn unreadable_ssh_key_is_reported() {
    let sandbox = Sandbox::new();

    sandbox
        .command()
        .env("CAPACITY_HUNTER_COMPARTMENT_ID", "ocid1.compartment.oc1..smoke")
        .env("CAPACITY_HUNTER_AVAILABILITY_DOMAIN", "Uocm:EU-FRANKFURT-1-AD-1")
        .env("CAPACITY_HUNTER_IMAGE_ID", "ocid1.image.oc1..smoke")
        .env("CAPACITY_HUNTER_SUBNET_ID", "ocid1.subnet.oc1..smoke")
        .env("CAPACITY_HUNTER_SSH_PUBLIC_KEY_FILE", "~/.ssh/missing.pub")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read SSH public key file"));
}

#[cfg(unix)]
#[test]
fn provisions_through_the_oci_cli_and_records_the_address() {
    let sandbox = Sandbox::new();
    let oci = sandbox.write("fake-oci", FAKE_OCI);
    make_executable(&oci);
    let key = sandbox.write("id_ed25519.pub", "ssh-ed25519 AAAAC3Nz smoke@test\n");

    sandbox
        .command()
        .args(["--hours", "0.1", "--interval", "60"])
        .env("CAPACITY_HUNTER_COMPARTMENT_ID", "ocid1.compartment.oc1..smoke")
        .env("CAPACITY_HUNTER_AVAILABILITY_DOMAIN", "Uocm:EU-FRANKFURT-1-AD-1")
        .env("CAPACITY_HUNTER_IMAGE_ID", "ocid1.image.oc1..smoke")
        .env("CAPACITY_HUNTER_SUBNET_ID", "ocid1.subnet.oc1..smoke")
        .env("CAPACITY_HUNTER_SSH_PUBLIC_KEY_FILE", key.as_str())
        .env("CAPACITY_HUNTER_OCI_BIN", oci.as_str())
        .env("CAPACITY_HUNTER_IP_FILE", "~/out/server_ip.txt")
        .env("CAPACITY_HUNTER_RECORD_FILE", "~/out/infra_ids.txt")
        .assert()
        .success()
        .stdout(predicate::str::contains("Will retry for up to 0.1 hours (6 attempts)"))
        .stdout(predicate::str::contains(
            "#1 Trying Full Free Tier (4 OCPU / 24 GB)... SUCCESS! Instance ID: ocid1.instance.oc1..smoke",
        ))
        .stdout(predicate::str::contains("VM READY!"))
        .stdout(predicate::str::contains("Config:    Full Free Tier (4 OCPU / 24 GB)"))
        .stdout(predicate::str::contains(format!(
            "ssh -i {} ubuntu@203.0.113.7",
            sandbox.root.join("id_ed25519")
        )))
        .stdout(predicate::str::contains("bash scripts/push-to-server.sh 203.0.113.7"));

    assert_eq!(sandbox.read("out/server_ip.txt"), "203.0.113.7");
    assert_eq!(
        sandbox.read("out/infra_ids.txt"),
        "instance_id=ocid1.instance.oc1..smoke\npublic_ip=203.0.113.7\n"
    );
}
