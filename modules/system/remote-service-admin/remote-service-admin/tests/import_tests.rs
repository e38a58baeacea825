#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Import-side tests: importer selection, proxy sharing, updates and close.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{admin_with, remote_endpoint, strings, FakeImporter, RecordingListener, DEMO_CONFIG};
use remote_service_admin::{LocalServiceRegistry, RemoteServiceAdminEventKind, RemoteServiceFailure};
use serde_json::json;

const FOO: &str = "org.demo.Foo";

// =============================================================================
// Selection Tests
// =============================================================================

#[test]
fn test_import_uses_first_matching_importer() {
    let registry = LocalServiceRegistry::new();
    let skipped = FakeImporter::new("imp-skip", &["other.config"], registry.clone());
    let first = FakeImporter::new("imp-1", &[DEMO_CONFIG], registry.clone());
    let second = FakeImporter::new("imp-2", &[DEMO_CONFIG], registry.clone());
    let admin = admin_with(&[], &[skipped.clone(), first.clone(), second.clone()]);
    let listener = Arc::new(RecordingListener::default());
    admin.add_listener(listener.clone());

    let import = admin.import_service(&remote_endpoint("ep-1", 11, &[FOO], &[DEMO_CONFIG]));

    assert!(import.exception().is_none());
    assert_eq!(import.importer_id().as_deref(), Some("imp-1"));
    assert_eq!((skipped.imports(), first.imports(), second.imports()), (0, 1, 0));

    let proxy = import.reference().expect("local proxy reference");
    assert_eq!(proxy.interfaces(), strings(&[FOO]));
    assert_eq!(proxy.property("proxy.importer"), Some(json!("imp-1")));
    assert_eq!(proxy.property("color"), Some(json!("blue")));
    assert_eq!(registry.references_for(FOO).len(), 1);

    let events = listener.events.lock().clone();
    assert_eq!(
        events,
        vec![(
            RemoteServiceAdminEventKind::ImportRegistration,
            Some("ep-1".to_owned()),
            Some("imp-1".to_owned())
        )]
    );
    assert_eq!(admin.imported_services().len(), 1);
}

#[test]
fn test_no_importer_is_not_registered() {
    let registry = LocalServiceRegistry::new();
    let importer = FakeImporter::new("imp-1", &["other.config"], registry);
    let admin = admin_with(&[], &[importer.clone()]);
    let listener = Arc::new(RecordingListener::default());
    admin.add_listener(listener.clone());
    let description = remote_endpoint("ep-1", 11, &[FOO], &[DEMO_CONFIG]);

    let import = admin.import_service(&description);

    let exception = import.exception().expect("selection failure");
    assert!(matches!(
        exception.as_ref(),
        RemoteServiceFailure::NoImporter { configs } if configs == &strings(&[DEMO_CONFIG])
    ));
    assert_eq!(import.description(), Some(description));
    assert!(import.reference().is_none());
    assert_eq!(importer.imports(), 0);
    assert!(admin.imported_services().is_empty());
    assert!(listener.kinds().is_empty());

    assert!(import.close());
    assert!(listener.kinds().is_empty());
}

#[test]
fn test_import_error_is_captured() {
    let registry = LocalServiceRegistry::new();
    let importer = FakeImporter::new("imp-1", &[DEMO_CONFIG], registry.clone());
    importer.fail_import.store(true, Ordering::SeqCst);
    let admin = admin_with(&[], &[importer.clone()]);
    let listener = Arc::new(RecordingListener::default());
    admin.add_listener(listener.clone());

    let import = admin.import_service(&remote_endpoint("ep-1", 11, &[FOO], &[DEMO_CONFIG]));

    assert!(import.exception().unwrap().is_provider_error());
    assert!(registry.is_empty());
    assert_eq!(listener.kinds(), vec![RemoteServiceAdminEventKind::ImportError]);
    assert_eq!(admin.imported_services().len(), 1);

    assert!(import.close());
    assert_eq!(importer.unimports(), 0);
    assert!(admin.imported_services().is_empty());
    assert_eq!(listener.kinds().len(), 1);
}

// =============================================================================
// Sharing Tests
// =============================================================================

#[test]
fn test_reimport_shares_proxy() {
    let registry = LocalServiceRegistry::new();
    let importer = FakeImporter::new("imp-1", &[DEMO_CONFIG], registry.clone());
    let admin = admin_with(&[], &[importer.clone()]);
    let listener = Arc::new(RecordingListener::default());
    admin.add_listener(listener.clone());
    let description = remote_endpoint("ep-1", 11, &[FOO], &[DEMO_CONFIG]);

    let first = admin.import_service(&description);
    let second = admin.import_service(&description);
    // a different endpoint id for the same remote service reuses the proxy too
    let third = admin.import_service(&remote_endpoint("ep-1b", 11, &[FOO], &[DEMO_CONFIG]));

    assert_eq!(importer.imports(), 1);
    assert_eq!(registry.len(), 1);
    assert_eq!(first.reference(), second.reference());
    assert_eq!(first.reference(), third.reference());
    assert_eq!(listener.count(RemoteServiceAdminEventKind::ImportRegistration), 1);
    assert_eq!(admin.imported_services().len(), 3);

    let endpoint = first.import_reference().unwrap().endpoint().cloned().unwrap();
    assert_eq!(endpoint.active_registrations(), 3);

    assert!(first.close());
    assert!(third.close());
    assert_eq!(importer.unimports(), 0);
    assert_eq!(registry.len(), 1);

    assert!(second.close());
    assert!(!second.close());
    assert_eq!(importer.unimports(), 1);
    assert!(registry.is_empty(), "proxy is unregistered with the last claim");
    assert!(admin.imported_services().is_empty());
    assert_eq!(listener.count(RemoteServiceAdminEventKind::ImportUnregistration), 1);
}

#[test]
fn test_distinct_services_get_distinct_proxies() {
    let registry = LocalServiceRegistry::new();
    let importer = FakeImporter::new("imp-1", &[DEMO_CONFIG], registry.clone());
    let admin = admin_with(&[], &[importer.clone()]);

    let a = admin.import_service(&remote_endpoint("ep-a", 1, &[FOO], &[DEMO_CONFIG]));
    let b = admin.import_service(&remote_endpoint("ep-b", 2, &[FOO], &[DEMO_CONFIG]));

    assert_eq!(importer.imports(), 2);
    assert_ne!(a.reference(), b.reference());
    assert_eq!(registry.references_for(FOO).len(), 2);
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_refreshes_proxy_properties() {
    let registry = LocalServiceRegistry::new();
    let importer = FakeImporter::new("imp-1", &[DEMO_CONFIG], registry.clone());
    let admin = admin_with(&[], &[importer.clone()]);
    let listener = Arc::new(RecordingListener::default());
    admin.add_listener(listener.clone());
    let import = admin.import_service(&remote_endpoint("ep-1", 11, &[FOO], &[DEMO_CONFIG]));

    let mut newer = remote_endpoint("ep-1", 11, &[FOO], &[DEMO_CONFIG]).properties().clone();
    newer.insert("color".to_owned(), json!("red"));
    newer.insert("size".to_owned(), json!(3));
    let newer = remote_service_admin::EndpointDescription::from_properties(newer).unwrap();

    let updated = import.update(&newer).expect("update succeeds");
    assert_eq!(updated.id(), "ep-1");
    assert_eq!(updated.property("color"), Some(&json!("red")));

    let proxy = import.reference().unwrap();
    assert_eq!(proxy.property("color"), Some(json!("red")));
    assert_eq!(proxy.property("size"), Some(json!(3)));
    assert_eq!(import.description(), Some(updated));
    assert_eq!(listener.count(RemoteServiceAdminEventKind::ImportUpdate), 1);
}

#[test]
fn test_failed_update_publishes_warning() {
    let registry = LocalServiceRegistry::new();
    let importer = FakeImporter::new("imp-1", &[DEMO_CONFIG], registry);
    let admin = admin_with(&[], &[importer.clone()]);
    let listener = Arc::new(RecordingListener::default());
    admin.add_listener(listener.clone());
    let description = remote_endpoint("ep-1", 11, &[FOO], &[DEMO_CONFIG]);
    let import = admin.import_service(&description);

    importer.fail_update.store(true, Ordering::SeqCst);
    assert!(import.update(&description).is_none());
    assert!(import.exception().unwrap().is_provider_error());
    assert_eq!(listener.count(RemoteServiceAdminEventKind::ImportWarning), 1);

    importer.fail_update.store(false, Ordering::SeqCst);
    assert!(import.update(&description).is_some());
    assert!(import.exception().is_none());
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_unimport_failure_keeps_registration_listed() {
    let registry = LocalServiceRegistry::new();
    let importer = FakeImporter::new("imp-1", &[DEMO_CONFIG], registry);
    importer.fail_unimport.store(true, Ordering::SeqCst);
    let admin = admin_with(&[], &[importer.clone()]);
    let listener = Arc::new(RecordingListener::default());
    admin.add_listener(listener.clone());
    let import = admin.import_service(&remote_endpoint("ep-1", 11, &[FOO], &[DEMO_CONFIG]));

    assert!(import.close());
    assert_eq!(importer.unimports(), 1);
    assert_eq!(listener.count(RemoteServiceAdminEventKind::ImportUnregistration), 0);
    assert_eq!(admin.imported_services().len(), 1);
    assert!(admin.imported_services()[0].is_closed());
}

#[test]
fn test_refused_unimport_can_be_retried() {
    let registry = LocalServiceRegistry::new();
    let importer = FakeImporter::new("imp-1", &[DEMO_CONFIG], registry.clone());
    importer.fail_unimport.store(true, Ordering::SeqCst);
    let admin = admin_with(&[], &[importer.clone()]);
    let listener = Arc::new(RecordingListener::default());
    admin.add_listener(listener.clone());
    let import = admin.import_service(&remote_endpoint("ep-1", 11, &[FOO], &[DEMO_CONFIG]));

    assert!(import.close());
    assert!(!import.retry_teardown());
    assert_eq!(importer.unimports(), 2);
    assert_eq!(registry.len(), 1);

    importer.fail_unimport.store(false, Ordering::SeqCst);
    assert!(import.retry_teardown());
    assert_eq!(importer.unimports(), 3);
    assert!(registry.is_empty());
    assert!(admin.imported_services().is_empty());
    assert_eq!(
        listener.kinds(),
        vec![
            RemoteServiceAdminEventKind::ImportRegistration,
            RemoteServiceAdminEventKind::ImportUnregistration,
        ]
    );
    assert!(!import.retry_teardown());
}
