//! End-to-end plugin host tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use plugin_host::contributions::RequestHook;
use plugin_host::plugins::PluginOrigin;
use plugin_host::{
    Error, FactoryLoader, HostHandle, IpcRouter, LocalIpcRouter, MenuItem, NetworkSession,
    PluginModule, PluginStatus, RendererPageSpec, RequestDetails, WebRequestFilter,
};
use serde_json::{Value, json};

mod common;
use common::Fixture;

/// Factory that counts how often it is instantiated
fn counting(calls: &Arc<AtomicUsize>) -> impl Fn() -> anyhow::Result<PluginModule> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(PluginModule::with_activate(|_| Ok(())))
    }
}

#[derive(Default)]
struct RecordingSession {
    hooks: Mutex<Vec<(WebRequestFilter, RequestHook)>>,
}

impl NetworkSession for RecordingSession {
    fn on_before_request(&self, filter: WebRequestFilter, hook: RequestHook) {
        self.hooks.lock().unwrap().push((filter, hook));
    }
}

#[test]
fn duplicate_ids_across_roots_are_both_activated() {
    let fx = Fixture::new();
    fx.bundled("shared", r#"{"id": "shared", "main": "shared.plugin"}"#, &["shared.plugin"]);
    fx.user("shared", r#"{"id": "shared", "main": "shared.plugin"}"#, &["shared.plugin"]);

    let activations = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&activations);
    let loader = FactoryLoader::new().with("shared", move || {
        let sink = Arc::clone(&sink);
        Ok(PluginModule::with_activate(move |ctx| {
            sink.lock().unwrap().push(ctx.plugin_dir().to_path_buf());
            Ok(())
        }))
    });

    let mut registry = fx.registry(loader);
    let summary = registry.load_all();

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.activated, 2);
    let origins: Vec<_> = registry.records().iter().map(|r| r.origin).collect();
    assert_eq!(origins, vec![PluginOrigin::Bundled, PluginOrigin::User]);

    let dirs = activations.lock().unwrap().clone();
    assert_eq!(dirs.len(), 2);
    assert!(dirs[0].starts_with(&fx.config.bundled_plugins_dir));
    assert!(dirs[1].starts_with(&fx.config.user_plugins_dir));
}

#[test]
fn failed_load_leaves_record_inert() {
    let fx = Fixture::new();
    fx.user("a-broken", r#"{"id": "broken", "main": "broken.plugin"}"#, &["broken.plugin"]);
    fx.user("b-fine", r#"{"id": "fine", "main": "fine.plugin"}"#, &["fine.plugin"]);

    let fine = Arc::new(AtomicUsize::new(0));
    let loader = FactoryLoader::new()
        .with("broken", || panic!("syntax error in plugin"))
        .with("fine", counting(&fine));

    let mut registry = fx.registry(loader);
    let summary = registry.load_all();

    let broken = registry.record("broken").unwrap();
    assert!(broken.module.is_none());
    assert_eq!(broken.status, PluginStatus::LoadFailed);
    assert_eq!(summary.load_failed, 1);

    assert_eq!(registry.record("fine").unwrap().status, PluginStatus::Active);
    assert_eq!(fine.load(Ordering::SeqCst), 1);
}

#[test]
fn activation_failure_does_not_stop_later_plugins() {
    let fx = Fixture::new();
    fx.user("a", r#"{"id": "a", "main": "throws.plugin"}"#, &["throws.plugin"]);
    fx.user("b", r#"{"id": "b", "main": "panics.plugin"}"#, &["panics.plugin"]);
    fx.user("c", r#"{"id": "c", "main": "after.plugin"}"#, &["after.plugin"]);

    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);
    let loader = FactoryLoader::new()
        .with("throws", || {
            Ok(PluginModule::with_activate(|ctx| {
                ctx.on("app-ready", |_| Ok(()));
                anyhow::bail!("activation blew up")
            }))
        })
        .with("panics", || Ok(PluginModule::callable(|_| panic!("activation panicked"))))
        .with("after", move || {
            let counter = Arc::clone(&counter);
            Ok(PluginModule::with_activate(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
        });

    let mut registry = fx.registry(loader);
    let summary = registry.load_all();

    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(summary.activation_failed, 2);
    assert_eq!(summary.activated, 1);
    // Registrations made before the failure are kept
    assert_eq!(registry.events().listener_count("app-ready"), 1);
}

#[test]
fn renderer_page_with_absolute_path() {
    let fx = Fixture::new();
    fx.user("pages", r#"{"main": "pages.plugin"}"#, &["pages.plugin"]);
    let loader = FactoryLoader::new().with("pages", || {
        Ok(PluginModule::with_activate(|ctx| {
            ctx.register_renderer_page(RendererPageSpec::new("x", "/abs/path/page.html"));
            Ok(())
        }))
    });

    let mut registry = fx.registry(loader);
    registry.load_all();

    let mut pages = registry.renderer_pages();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].file_url, "file:///abs/path/page.html");
    assert_eq!(pages[0].plugin_id, "pages");

    pages[0].file_url = "file:///tampered.html".to_string();
    pages.clear();

    let fresh = registry.renderer_pages();
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].file_url, "file:///abs/path/page.html");
    assert_eq!(
        registry.resolve_page_url("plugin-page://x").as_deref(),
        Some("file:///abs/path/page.html")
    );
}

#[tokio::test]
async fn set_enabled_unknown_id_fails() {
    let fx = Fixture::new();
    fx.user("known", r#"{"id": "known"}"#, &[]);

    let mut registry = fx.registry(FactoryLoader::new());
    registry.load_all();

    let err = registry.set_enabled("missing-id", false).await.unwrap_err();
    assert!(matches!(err, Error::PluginNotFound(id) if id == "missing-id"));
}

#[tokio::test]
async fn set_enabled_takes_effect_on_next_load() {
    let fx = Fixture::new();
    fx.user("toggle", r#"{"id": "toggle", "main": "toggle.plugin"}"#, &["toggle.plugin"]);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut registry = fx.registry(FactoryLoader::new().with("toggle", counting(&calls)));
    registry.load_all();
    assert_eq!(registry.record("toggle").unwrap().status, PluginStatus::Active);

    registry.set_enabled("toggle", false).await.unwrap();
    // Unchanged until the next pass
    assert!(registry.record("toggle").unwrap().enabled);

    registry.load_all();
    let record = registry.record("toggle").unwrap();
    assert!(!record.enabled);
    assert_eq!(record.status, PluginStatus::Disabled);
}

#[test]
fn non_object_web_request_result_proceeds() {
    let fx = Fixture::new();
    fx.user("net", r#"{"main": "net.plugin"}"#, &["net.plugin"]);
    let loader = FactoryLoader::new().with("net", || {
        Ok(PluginModule::with_activate(|ctx| {
            ctx.register_web_request(WebRequestFilter::urls(["*://ads.example/*"]), |_| Ok(json!(true)));
            ctx.register_web_request(WebRequestFilter::default(), |details| {
                Ok(json!({"cancel": details.url.contains("tracker")}))
            });
            Ok(())
        }))
    });

    let mut registry = fx.registry(loader);
    registry.load_all();

    let session = RecordingSession::default();
    assert_eq!(registry.apply_web_requests(&session), 2);

    let hooks = session.hooks.lock().unwrap();
    assert_eq!(hooks[0].0.urls, vec!["*://ads.example/*"]);

    let details = RequestDetails {
        url: "https://tracker.example/p".to_string(),
        method: "GET".to_string(),
        ..RequestDetails::default()
    };
    let first = (hooks[0].1)(&details);
    assert!(!first.is_cancel());
    assert_eq!(first.0.get("cancel"), Some(&Value::Bool(false)));
    assert!((hooks[1].1)(&details).is_cancel());
}

#[test]
fn context_menu_contributors_extend_template() {
    let fx = Fixture::new();
    fx.user("a", r#"{"id": "a", "main": "menu.plugin"}"#, &["menu.plugin"]);
    fx.user("b", r#"{"id": "b", "main": "broken-menu.plugin"}"#, &["broken-menu.plugin"]);
    let loader = FactoryLoader::new()
        .with("menu", || {
            Ok(PluginModule::with_activate(|ctx| {
                ctx.contribute_context_menu(|template, params, _| {
                    if !params.selection_text.is_empty() {
                        template.push(MenuItem::new("Search selection").with_command("search"));
                    }
                    Ok(())
                });
                Ok(())
            }))
        })
        .with("broken-menu", || {
            Ok(PluginModule::with_activate(|ctx| {
                ctx.contribute_context_menu(|_, _, _| anyhow::bail!("menu bug"));
                Ok(())
            }))
        });

    let mut registry = fx.registry(loader);
    registry.load_all();
    assert_eq!(registry.context_menu_count(), 2);

    let mut template = vec![MenuItem::new("Copy")];
    let params = plugin_host::ContextMenuParams {
        selection_text: "rust".to_string(),
        ..Default::default()
    };
    let applied = registry.apply_context_menu(&mut template, &params, &plugin_host::SurfaceRef::default());

    assert_eq!(applied, 1);
    let labels: Vec<_> = template.iter().filter_map(|i| i.label.as_deref()).collect();
    assert_eq!(labels, vec!["Copy", "Search selection"]);
}

#[test]
fn reload_invalidates_only_the_named_plugin() {
    let fx = Fixture::new();
    fx.user("a", r#"{"id": "a", "main": "a.plugin"}"#, &["a.plugin"]);
    fx.user("b", r#"{"id": "b", "main": "b.plugin"}"#, &["b.plugin"]);
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));
    let loader = FactoryLoader::new().with("a", counting(&a)).with("b", counting(&b));

    let mut registry = fx.registry(loader);
    registry.load_all();
    assert_eq!((a.load(Ordering::SeqCst), b.load(Ordering::SeqCst)), (1, 1));

    registry.reload(Some("a"));
    assert_eq!((a.load(Ordering::SeqCst), b.load(Ordering::SeqCst)), (2, 1));

    registry.reload(None);
    assert_eq!((a.load(Ordering::SeqCst), b.load(Ordering::SeqCst)), (3, 2));

    // Unknown id invalidates nothing but still reloads
    let summary = registry.reload(Some("nobody"));
    assert_eq!(summary.activated, 2);
    assert_eq!((a.load(Ordering::SeqCst), b.load(Ordering::SeqCst)), (3, 2));
}

#[test]
fn reloaded_plugin_rebinds_its_ipc_channel() {
    let fx = Fixture::new();
    fx.user("p", r#"{"id": "p", "main": "p.plugin"}"#, &["p.plugin"]);

    let instances = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&instances);
    let loader = FactoryLoader::new().with("p", move || {
        let instance = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PluginModule::with_activate(move |ctx| {
            ctx.register_ipc("p:instance", move |_| Ok(json!(instance)));
            Ok(())
        }))
    });

    let router = Arc::new(LocalIpcRouter::new());
    let host = HostHandle::new(Arc::clone(&router) as Arc<dyn IpcRouter>);
    let mut registry = fx.registry_with_host(loader, host);

    registry.load_all();
    assert_eq!(router.invoke("p:instance", &[]).unwrap(), json!(1));

    let summary = registry.reload(Some("p"));
    assert_eq!(summary.activated, 1);
    assert_eq!(router.invoke("p:instance", &[]).unwrap(), json!(2));
    assert_eq!(router.channels(), vec!["p:instance"]);
}

#[test]
fn ipc_channel_of_disabled_plugin_is_unbound_on_reload() {
    let fx = Fixture::new();
    let dir = fx.user("p", r#"{"id": "p", "main": "p.plugin"}"#, &["p.plugin"]);
    let loader = FactoryLoader::new().with("p", || {
        Ok(PluginModule::with_activate(|ctx| {
            ctx.register_ipc("p:ping", |_| Ok(json!("pong")));
            Ok(())
        }))
    });

    let router = Arc::new(LocalIpcRouter::new());
    let host = HostHandle::new(Arc::clone(&router) as Arc<dyn IpcRouter>);
    let mut registry = fx.registry_with_host(loader, host);
    registry.load_all();
    assert!(router.invoke("p:ping", &[]).is_ok());

    std::fs::write(
        dir.join(plugin_host::plugins::MANIFEST_FILE),
        r#"{"id": "p", "enabled": false, "main": "p.plugin"}"#,
    )
    .unwrap();
    registry.reload(None);

    assert!(router.invoke("p:ping", &[]).is_err());
    assert!(router.channels().is_empty());
}

#[test]
fn reload_survives_entry_that_cannot_be_invalidated() {
    let fx = Fixture::new();
    let dir = fx.user("a", r#"{"id": "a", "main": "a.plugin"}"#, &["a.plugin"]);
    fx.user("b", r#"{"id": "b", "main": "b.plugin"}"#, &["b.plugin"]);
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));
    let loader = FactoryLoader::new().with("a", counting(&a)).with("b", counting(&b));

    let mut registry = fx.registry(loader);
    assert_eq!(registry.load_all().activated, 2);

    std::fs::remove_file(dir.join("a.plugin")).unwrap();
    let summary = registry.reload(Some("a"));

    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.load_failed, 1);
    assert_eq!(summary.activated, 1);
    assert_eq!(registry.record("a").unwrap().status, PluginStatus::LoadFailed);
    assert!(registry.record("a").unwrap().module.is_none());
    assert_eq!(registry.record("b").unwrap().status, PluginStatus::Active);
    assert_eq!(b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn set_enabled_leaves_every_copy_untouched_when_one_is_invalid() {
    let fx = Fixture::new();
    let bundled_manifest = r#"{"id": "dup", "main": "dup.plugin"}"#;
    let bundled = fx.bundled("dup", bundled_manifest, &["dup.plugin"]);
    let user = fx.user("dup", r#"{"id": "dup"}"#, &[]);

    let mut registry = fx.registry(FactoryLoader::new());
    registry.load_all();
    assert_eq!(registry.records().len(), 2);

    // Replaced after discovery so both records exist
    std::fs::write(user.join(plugin_host::plugins::MANIFEST_FILE), "[1]").unwrap();

    let err = registry.set_enabled("dup", false).await.unwrap_err();
    assert!(matches!(err, Error::Manifest(_)));

    let manifest = |dir: &std::path::Path| {
        std::fs::read_to_string(dir.join(plugin_host::plugins::MANIFEST_FILE)).unwrap()
    };
    assert_eq!(manifest(bundled.as_path()), bundled_manifest);
    assert_eq!(manifest(user.as_path()), "[1]");
}

#[test]
fn discovery_lists_disabled_without_running_code() {
    let fx = Fixture::new();
    fx.bundled("off", r#"{"id": "off", "enabled": false, "main": "off.plugin"}"#, &["off.plugin"]);
    fx.user("on", r#"{"id": "on", "categories": "tools", "authors": ["Ann", {"name": "Bo"}, {}]}"#, &[]);
    let calls = Arc::new(AtomicUsize::new(0));

    let registry = fx.registry(FactoryLoader::new().with("off", counting(&calls)));
    let plugins = registry.discover_plugins();

    assert_eq!(plugins.len(), 2);
    assert_eq!(plugins[0].id, "off");
    assert!(!plugins[0].enabled);
    assert!(plugins[0].has_main);
    assert_eq!(plugins[1].categories, vec!["tools"]);
    assert_eq!(plugins[1].authors, vec!["Ann", "Bo"]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(registry.records().is_empty());
}

#[test]
fn missing_and_malformed_manifests_are_skipped() {
    let fx = Fixture::new();
    fx.user("good", r#"{"id": "good"}"#, &[]);
    fx.user("bad", "{ not json", &[]);
    std::fs::create_dir_all(fx.config.user_plugins_dir.join("empty")).unwrap();

    let mut registry = fx.registry(FactoryLoader::new());
    let summary = registry.load_all();

    assert_eq!(summary.discovered, 1);
    assert_eq!(registry.records()[0].id, "good");
    assert_eq!(registry.records()[0].status, PluginStatus::NoEntry);
}

#[test]
fn host_primitives_reach_plugins() {
    let fx = Fixture::new();
    fx.user("prim", r#"{"main": "prim.plugin"}"#, &["prim.plugin"]);
    let seen = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&seen);
    let loader = FactoryLoader::new().with("prim", move || {
        let sink = Arc::clone(&sink);
        Ok(PluginModule::with_activate(move |ctx| {
            let windows = ctx
                .host()
                .primitive::<AtomicUsize>("windows")
                .ok_or_else(|| anyhow::anyhow!("no window primitive"))?;
            sink.store(windows.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        }))
    });

    let host = plugin_host::HostHandle::default().with_primitive("windows", Arc::new(AtomicUsize::new(4)));
    let mut registry = plugin_host::PluginRegistry::new(fx.config.clone(), Arc::new(loader), host);
    registry.load_all();

    assert_eq!(seen.load(Ordering::SeqCst), 4);
}
