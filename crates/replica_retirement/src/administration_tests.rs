use super::*;
use std::fs;
use tempfile::TempDir;

#[cfg(unix)]
fn fake_python(dir: &TempDir, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join("fake-python");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write fake interpreter");
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();
    path
}

#[test]
fn test_unregister_script_uses_arguments() {
    assert!(UNREGISTER_SCRIPT.contains("arcpy.management.UnregisterReplica"));
    assert!(UNREGISTER_SCRIPT.contains("sys.argv[1], sys.argv[2]"));
}

#[test]
fn test_new_keeps_interpreter_path() {
    let admin = ArcpyAdministrator::new("propy");
    assert_eq!(admin.python(), Path::new("propy"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unregister_replica_passes_destination_and_id() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let log = dir.path().join("calls.log");
    let python = fake_python(
        &dir,
        &format!("printf '%s|%s|%s\\n' \"$1\" \"$3\" \"$4\" >> '{}'", log.display()),
    );

    let admin = ArcpyAdministrator::new(&python);
    admin
        .unregister_replica(Path::new("/gis/replicaAdmin_QA.sde"), "A1B2C3D4-0000-0000-0000-000000000001")
        .await
        .expect("fake interpreter succeeds");

    let calls = fs::read_to_string(&log).unwrap();
    assert_eq!(
        calls,
        "-c|/gis/replicaAdmin_QA.sde|A1B2C3D4-0000-0000-0000-000000000001\n"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_unregister_replica_reports_stderr() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let python = fake_python(
        &dir,
        "echo 'ERROR 000732: Replica does not exist' >&2\nexit 1",
    );

    let admin = ArcpyAdministrator::new(&python);
    let result = admin
        .unregister_replica(Path::new("admin.sde"), "missing-id")
        .await;

    match result {
        Err(Error::Administration {
            replica_id,
            message,
        }) => {
            assert_eq!(replica_id, "missing-id");
            assert_eq!(message, "ERROR 000732: Replica does not exist");
        }
        other => panic!("Expected Administration error, got {:?}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_unregister_replica_silent_failure_reports_status() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let python = fake_python(&dir, "exit 3");

    let admin = ArcpyAdministrator::new(&python);
    let result = admin.unregister_replica(Path::new("admin.sde"), "id-1").await;

    match result {
        Err(Error::Administration { message, .. }) => {
            assert!(message.starts_with("arcpy exited with"));
        }
        other => panic!("Expected Administration error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unregister_replica_missing_interpreter() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let admin = ArcpyAdministrator::new(dir.path().join("no-such-python"));

    let result = admin.unregister_replica(Path::new("admin.sde"), "id-1").await;

    match result {
        Err(Error::Administration {
            replica_id,
            message,
        }) => {
            assert_eq!(replica_id, "id-1");
            assert!(message.contains("failed to launch"));
        }
        other => panic!("Expected Administration error, got {:?}", other),
    }
}
