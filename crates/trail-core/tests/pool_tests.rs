// Pool lifecycle against the in-memory host: ordering, barrier, rollback and retuning.

use std::rc::Rc;
use tokio::task::LocalSet;
use trail_core::sandbox::{JournalEntry, Latency, SandboxHost};
use trail_core::*;

async fn reference_pool(host: &Rc<SandboxHost>, config: &ControllerConfig) -> (InstancePool<SandboxHost>, Tuning) {
    let pool_config = resolve_config(&**host, config).await.unwrap();
    (InstancePool::new(Rc::clone(host), pool_config), Tuning::default())
}

fn pool_of(size: usize) -> ControllerConfig {
    ControllerConfig::default().with_pool_size(size)
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn create_all_builds_every_index_in_order() {
    LocalSet::new()
        .run_until(async {
            let host = Rc::new(SandboxHost::with_reference_scene(4, 1));
            let (pool, tuning) = reference_pool(&host, &pool_of(8)).await;
            let live = pool.create_all(&tuning).await.unwrap();
            assert_eq!(live.len(), 8);

            // each index is fully created and attached before the next starts
            let journal = host.journal();
            for (i, step) in journal.chunks(3).enumerate() {
                let name = format!("mesh{i}");
                assert!(matches!(&step[0], JournalEntry::CreateIssued { name: n } if *n == name));
                assert!(matches!(&step[1], JournalEntry::CreateResolved { name: n, .. } if *n == name));
                assert!(matches!(&step[2], JournalEntry::Attached { .. }));
            }

            let parent = host.find_live(PARENT_NODE_NAME).unwrap();
            assert_eq!(host.children_of(parent).len(), 8);

            let first = host.material_of(live.get(0).unwrap().node).unwrap();
            assert_eq!(first.material.name, "mask-material00");
            assert_eq!(first.diffuse.name, TEXTURE_NAME);
            assert_eq!(first.opacity, 0.0);
            let last = host.material_of(live.get(7).unwrap().node).unwrap();
            assert_eq!(last.material.name, "mask-material03");
            assert_eq!(last.opacity, 0.875);
            assert_eq!(live.get(7).unwrap().params.smoothing_factor, 350.0);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn rebuild_destroys_everything_before_creating() {
    LocalSet::new()
        .run_until(async {
            let latency = Latency {
                create_ms: 5,
                destroy_ms: 20,
                attach_ms: 1,
                jitter_ms: 30,
            };
            let host = Rc::new(SandboxHost::with_reference_scene(3, 7).with_latency(latency));
            let (pool, tuning) = reference_pool(&host, &pool_of(12)).await;
            let live = pool.create_all(&tuning).await.unwrap();
            host.clear_journal();

            let rebuilt = pool.rebuild(live, &tuning).await.unwrap();
            assert_eq!(rebuilt.len(), 12);

            let journal = host.journal();
            let first_create = journal
                .iter()
                .position(|e| matches!(e, JournalEntry::CreateIssued { .. }))
                .unwrap();
            let destroyed = journal[..first_create]
                .iter()
                .filter(|e| matches!(e, JournalEntry::DestroyResolved { .. }))
                .count();
            assert_eq!(destroyed, 12);
            assert!(!journal[first_create..]
                .iter()
                .any(|e| matches!(e, JournalEntry::DestroyIssued { .. } | JournalEntry::DestroyResolved { .. })));

            // teardown is issued as a batch, not one node at a time
            let last_issue = journal
                .iter()
                .rposition(|e| matches!(e, JournalEntry::DestroyIssued { .. }))
                .unwrap();
            let first_resolve = journal
                .iter()
                .position(|e| matches!(e, JournalEntry::DestroyResolved { .. }))
                .unwrap();
            assert!(last_issue < first_resolve);
            assert_eq!(host.live_count(NODE_KIND), 12);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn rebuild_reproduces_identical_parameters() {
    LocalSet::new()
        .run_until(async {
            let host = Rc::new(SandboxHost::with_reference_scene(5, 3));
            let (pool, tuning) = reference_pool(&host, &pool_of(20)).await;
            let live = pool.create_all(&tuning).await.unwrap();
            let before = live.parameters();

            let once = pool.rebuild(live, &tuning).await.unwrap();
            let twice = pool.rebuild(once, &tuning).await.unwrap();
            assert_eq!(twice.parameters(), before);
            assert_eq!(twice.generation, 3);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn create_failure_stops_and_rolls_back() {
    LocalSet::new()
        .run_until(async {
            let host = Rc::new(SandboxHost::with_reference_scene(2, 1));
            let (pool, tuning) = reference_pool(&host, &pool_of(6)).await;
            host.fail_create_of(Some("mesh3"));

            let err = pool.create_all(&tuning).await.unwrap_err();
            assert!(matches!(
                err,
                TrailError::Collaborator {
                    op: "create_node",
                    index: Some(3),
                    ..
                }
            ));
            assert!(!host
                .journal()
                .iter()
                .any(|e| matches!(e, JournalEntry::CreateIssued { name } if name == "mesh4")));
            assert_eq!(host.live_count(NODE_KIND), 0);
            assert_eq!(host.delay_source_count(), 0);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn destroy_failure_aborts_before_create() {
    LocalSet::new()
        .run_until(async {
            let host = Rc::new(SandboxHost::with_reference_scene(2, 1));
            let (pool, tuning) = reference_pool(&host, &pool_of(5)).await;
            let live = pool.create_all(&tuning).await.unwrap();
            host.clear_journal();
            host.fail_destroy_of(Some("mesh2"));

            let err = pool.rebuild(live, &tuning).await.unwrap_err();
            assert!(matches!(
                err,
                TrailError::Collaborator {
                    op: "destroy_node",
                    index: Some(2),
                    ..
                }
            ));
            assert!(!host
                .journal()
                .iter()
                .any(|e| matches!(e, JournalEntry::CreateIssued { .. })));
            // every other destroy still ran to completion
            assert_eq!(host.live_count(NODE_KIND), 1);
            assert_eq!(pool.orphan_count(), 1);
            assert_eq!(host.delay_source_count(), 6);

            // the orphan blocks creation until it can be destroyed
            assert!(pool.create_all(&tuning).await.is_err());
            assert_eq!(host.live_count(NODE_KIND), 1);

            host.fail_destroy_of(None);
            host.clear_journal();
            let live = pool.create_all(&tuning).await.unwrap();
            let journal = host.journal();
            let first_create = journal
                .iter()
                .position(|e| matches!(e, JournalEntry::CreateIssued { .. }))
                .unwrap();
            assert!(journal[..first_create]
                .iter()
                .any(|e| matches!(e, JournalEntry::DestroyResolved { .. })));
            assert_eq!(pool.orphan_count(), 0);
            assert_eq!(host.live_count(NODE_KIND), 5);
            assert_eq!(host.delay_source_count(), 5 * 6);

            let parent = host.find_live(PARENT_NODE_NAME).unwrap();
            let mesh2: Vec<_> = host
                .children_of(parent)
                .into_iter()
                .filter(|id| host.name_of(*id).as_deref() == Some("mesh2"))
                .collect();
            assert_eq!(mesh2, vec![live.get(2).unwrap().node]);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn generations_never_share_delay_sources() {
    LocalSet::new()
        .run_until(async {
            // no latency: both generations are bound at the same instant
            let host = Rc::new(SandboxHost::with_reference_scene(2, 1));
            let (pool, mut tuning) = reference_pool(&host, &pool_of(3)).await;
            let old = pool.create_all(&tuning).await.unwrap();
            let old_keys = old.get(1).unwrap().bindings.sources.clone();
            let fresh = pool.create_all(&tuning).await.unwrap();
            let fresh_keys = &fresh.get(1).unwrap().bindings.sources;
            assert!(old_keys.iter().all(|k| !fresh_keys.contains(k)));
            assert_eq!(host.delay_source_count(), 2 * 3 * 6);

            // releasing the old generation leaves the new one intact
            pool.destroy_all(old).await.unwrap();
            let mut fresh = fresh;
            tuning.delay_base = 6.0;
            pool.reparametrize(&mut fresh, &tuning);
            let node = fresh.get(1).unwrap().node;
            assert_eq!(host.effective_delay(node, Axis::Y), Some(delay_magnitude(1, 3, 6.0)));
            assert_eq!(host.delay_source_count(), 3 * 6);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn missing_resources_are_fatal() {
    LocalSet::new()
        .run_until(async {
            let bare = SandboxHost::empty(1);
            let err = resolve_config(&bare, &ControllerConfig::default()).await.unwrap_err();
            assert!(matches!(err, TrailError::NotFound { kind: "scene node", .. }));

            let no_materials = SandboxHost::with_reference_scene(0, 1);
            let err = resolve_config(&no_materials, &ControllerConfig::default())
                .await
                .unwrap_err();
            assert!(matches!(err, TrailError::NotFound { kind: "material pattern", .. }));

            let host = SandboxHost::with_reference_scene(2, 1);
            let err = resolve_config(&host, &pool_of(0)).await.unwrap_err();
            assert!(matches!(err, TrailError::InvalidPoolSize(0)));
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn named_sources_retune_without_rebinding() {
    LocalSet::new()
        .run_until(async {
            let host = Rc::new(SandboxHost::with_reference_scene(3, 1));
            let (pool, mut tuning) = reference_pool(&host, &pool_of(10)).await;
            let mut live = pool.create_all(&tuning).await.unwrap();
            assert_eq!(host.delay_source_count(), 60);
            let smoothing_before: Vec<_> = live.iter().map(|i| i.params.smoothing_factor).collect();

            tuning.delay_base = 12.0;
            pool.reparametrize(&mut live, &tuning);

            for instance in live.iter() {
                let expected = delay_magnitude(instance.index, 10, 12.0);
                assert_eq!(instance.params.delay_magnitude, expected);
                assert_eq!(host.bind_calls(instance.node), 6);
                for axis in Axis::ALL {
                    assert_eq!(host.effective_delay(instance.node, axis), Some(expected));
                }
            }
            let smoothing_after: Vec<_> = live.iter().map(|i| i.params.smoothing_factor).collect();
            assert_eq!(smoothing_before, smoothing_after);

            pool.destroy_all(live).await.unwrap();
            assert_eq!(host.delay_source_count(), 0);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn baked_delays_retune_by_rebinding() {
    LocalSet::new()
        .run_until(async {
            let host = Rc::new(SandboxHost::with_reference_scene(3, 1));
            let config = pool_of(4).with_delay_binding(DelayBinding::Baked);
            let (pool, mut tuning) = reference_pool(&host, &config).await;
            let mut live = pool.create_all(&tuning).await.unwrap();
            assert_eq!(host.delay_source_count(), 0);

            tuning.delay_base = 8.0;
            pool.reparametrize(&mut live, &tuning);
            let last = live.get(3).unwrap();
            assert_eq!(host.bind_calls(last.node), 12);
            let expr = host.channel_of(last.node, Axis::RotationY).unwrap();
            assert_eq!(expr.delay, DelayParam::Fixed(64.0));
            assert_eq!(expr.smoothing, last.params.smoothing_factor);
        })
        .await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn later_instances_trail_further_behind() {
    LocalSet::new()
        .run_until(async {
            let host = Rc::new(SandboxHost::with_reference_scene(2, 1));
            let (pool, mut tuning) = reference_pool(&host, &pool_of(4)).await;
            tuning.delay_base = 40.0;
            let live = pool.create_all(&tuning).await.unwrap();

            for step in 0..=300 {
                let t = step as f64 * 10.0;
                host.push_transform(t, Transform::new(glam::Vec3::new(t as f32, 0.0, 0.0), glam::Vec3::ZERO));
                host.advance(t);
            }
            let xs: Vec<f32> = live
                .iter()
                .map(|i| host.transform_of(i.node).unwrap().position.x)
                .collect();
            for w in xs.windows(2) {
                assert!(w[0] > w[1], "expected decreasing follow, got {xs:?}");
            }
            assert!(xs[3] < 3_000.0 - 1_600.0);
        })
        .await;
}
