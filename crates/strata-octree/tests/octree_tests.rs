use strata_geom::Vec3;
use strata_octree::{
    OctreeError, PackedOctree, ProbeRay, SurfaceHit, TraceRay, VoxelStore, VoxelType,
};

fn opaque(_: VoxelType, _: &ProbeRay) -> Option<SurfaceHit> {
    Some(SurfaceHit {
        distance: 0.0,
        color: Vec3::new(1.0, 0.5, 0.25),
        emittance: Vec3::ZERO,
    })
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

fn ray_down_z(x: f32, y: f32) -> TraceRay {
    TraceRay::new(0, 0, 0, Vec3::new(x, y, -5.0), Vec3::new(0.0, 0.0, 1.0))
}

#[test]
fn fresh_tree_reads_air() {
    let mut tree = PackedOctree::new(5, [0.0; 3]).unwrap();
    assert_eq!(tree.read(17, 3, 30), 0);
    assert_eq!(tree.read_with_level(17, 3, 30), (0, 5));
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.total_depth(), 5);
}

#[test]
fn single_voxel_then_clear_restores_root() {
    let mut tree = PackedOctree::new(3, [0.0; 3]).unwrap();
    tree.write(1, 0, 0, 0).unwrap();
    assert_eq!(tree.read(0, 0, 0), 1);
    assert_eq!(tree.read(1, 0, 0), 0);
    // 1 root + 3 levels of 8 children.
    assert_eq!(tree.node_count(), 1 + 3 * 8);
    tree.write(0, 0, 0, 0).unwrap();
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.cells()[0], 0);
    assert_eq!(tree.arena().free_blocks(), 3);
}

#[test]
fn freed_blocks_are_reused() {
    let mut tree = PackedOctree::new(3, [0.0; 3]).unwrap();
    tree.set(1, 0, 0, 0).unwrap();
    tree.set(0, 0, 0, 0).unwrap();
    let size = tree.size();
    tree.set(2, 7, 7, 7).unwrap();
    assert_eq!(tree.size(), size);
    assert_eq!(tree.arena().free_blocks(), 0);
}

#[test]
fn filling_a_tree_collapses_to_root_leaf() {
    let mut tree = PackedOctree::new(2, [0.0; 3]).unwrap();
    for x in 0..4 {
        for y in 0..4 {
            for z in 0..4 {
                tree.set(9, x, y, z).unwrap();
            }
        }
    }
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.get_with_level(2, 1, 3), (9, 2));
}

#[test]
fn rejects_types_that_do_not_fit_a_cell() {
    let mut tree = PackedOctree::new(2, [0.0; 3]).unwrap();
    assert!(matches!(
        tree.set(u32::MAX, 0, 0, 0),
        Err(OctreeError::InvalidType(_))
    ));
    assert_eq!(tree.node_count(), 1);
}

#[test]
fn hit_on_front_face() {
    let mut tree = PackedOctree::new(4, [0.0; 3]).unwrap();
    tree.set(1, 3, 3, 0).unwrap();
    let mut ray = ray_down_z(3.5, 3.5);
    assert!(tree.intersect(&mut ray, &opaque));
    assert!(approx(ray.distance, 5.0), "distance {}", ray.distance);
    assert_eq!(ray.normal, Vec3::new(0.0, 0.0, -1.0));
    assert_eq!(ray.color, Vec3::new(1.0, 0.5, 0.25));
}

#[test]
fn hit_after_skipping_empty_cells() {
    let mut tree = PackedOctree::new(4, [0.0; 3]).unwrap();
    tree.set(1, 3, 3, 3).unwrap();
    let mut ray = ray_down_z(3.5, 3.5);
    assert!(tree.intersect(&mut ray, &opaque));
    assert!(approx(ray.distance, 8.0), "distance {}", ray.distance);
    assert_eq!(ray.normal, Vec3::new(0.0, 0.0, -1.0));
    let p = ray.hit_point().unwrap();
    assert!(approx(p.z, 3.0));
}

#[test]
fn miss_leaves_ray_untouched() {
    let mut tree = PackedOctree::new(3, [0.0; 3]).unwrap();
    tree.set(1, 3, 3, 3).unwrap();

    let mut away = TraceRay::new(0, 0, 0, Vec3::new(3.5, 3.5, -5.0), Vec3::new(0.0, 0.0, -1.0));
    assert!(!tree.intersect(&mut away, &opaque));
    assert!(!away.is_hit());

    let mut beside = ray_down_z(6.5, 1.5);
    assert!(!tree.intersect(&mut beside, &opaque));
    assert_eq!(beside.distance, f32::INFINITY);
    assert_eq!(beside.normal, Vec3::ZERO);
}

#[test]
fn closer_prior_hit_wins() {
    let mut tree = PackedOctree::new(3, [0.0; 3]).unwrap();
    tree.set(1, 3, 3, 3).unwrap();
    let mut ray = ray_down_z(3.5, 3.5);
    ray.distance = 6.0;
    ray.color = Vec3::splat(0.1);
    assert!(!tree.intersect(&mut ray, &opaque));
    assert_eq!(ray.distance, 6.0);
    assert_eq!(ray.color, Vec3::splat(0.1));
}

#[test]
fn transparent_types_are_passed_through() {
    let mut tree = PackedOctree::new(3, [0.0; 3]).unwrap();
    tree.set(2, 3, 3, 1).unwrap();
    tree.set(1, 3, 3, 4).unwrap();
    let glassy = |voxel: VoxelType, probe: &ProbeRay| {
        (voxel == 1).then(|| SurfaceHit {
            distance: 0.0,
            color: probe.normal,
            emittance: Vec3::ZERO,
        })
    };
    let mut ray = ray_down_z(3.5, 3.5);
    assert!(tree.intersect(&mut ray, &glassy));
    assert!(approx(ray.distance, 9.0), "distance {}", ray.distance);
    assert_eq!(ray.color, Vec3::new(0.0, 0.0, -1.0));
}

#[test]
fn ray_starting_inside_marches_from_zero() {
    let mut tree = PackedOctree::new(3, [0.0; 3]).unwrap();
    tree.set(1, 6, 1, 1).unwrap();
    let mut ray = TraceRay::new(0, 0, 0, Vec3::new(0.5, 1.5, 1.5), Vec3::new(1.0, 0.0, 0.0));
    assert!(tree.intersect(&mut ray, &opaque));
    assert!(approx(ray.distance, 5.5), "distance {}", ray.distance);
    assert_eq!(ray.normal, Vec3::new(-1.0, 0.0, 0.0));
}

#[test]
fn far_max_face_entry_still_hits() {
    let mut tree = PackedOctree::new(4, [0.0; 3]).unwrap();
    tree.set(1, 15, 3, 3).unwrap();
    for d in [100.0f32, 3000.0, 100_000.0] {
        let mut ray = TraceRay::new(
            0,
            0,
            0,
            Vec3::new(16.0 + d, 3.5, 3.5),
            Vec3::new(-1.0, 0.0, 0.0),
        );
        assert!(tree.intersect(&mut ray, &opaque), "missed from {d}");
        assert_eq!(ray.distance, d);
        assert_eq!(ray.normal, Vec3::new(1.0, 0.0, 0.0));
    }
}

#[test]
fn far_negative_crossings_reach_inner_voxels() {
    let mut tree = PackedOctree::new(4, [0.0; 3]).unwrap();
    tree.set(1, 3, 3, 3).unwrap();
    for d in [100.0f32, 3000.0] {
        let mut ray = TraceRay::new(
            0,
            0,
            0,
            Vec3::new(3.5, 3.5, 16.0 + d),
            Vec3::new(0.0, 0.0, -1.0),
        );
        assert!(tree.intersect(&mut ray, &opaque), "missed from {d}");
        assert!(approx(ray.distance, d + 12.0), "distance {}", ray.distance);
        assert_eq!(ray.normal, Vec3::new(0.0, 0.0, 1.0));
    }

    // Aimed at the voxel center, entering through the z = 4 face at y = 3.75.
    let dir = Vec3::new(0.0, -1.0, -2.0).normalized();
    let start = Vec3::new(3.5, 3.5, 3.5) - dir * 3000.0;
    let mut ray = TraceRay::new(0, 0, 0, start, dir);
    assert!(tree.intersect(&mut ray, &opaque));
    assert_eq!(ray.normal, Vec3::new(0.0, 0.0, 1.0));
    let expected = 3000.0 - 0.25 * 5.0f32.sqrt();
    assert!((ray.distance - expected).abs() < 1e-2, "distance {}", ray.distance);
    let p = ray.hit_point().unwrap();
    assert!((p.y - 3.75).abs() < 1e-2 && (p.z - 4.0).abs() < 1e-2, "hit at {p:?}");
}

#[test]
fn origin_just_below_zero_is_outside() {
    let mut tree = PackedOctree::new(3, [0.0; 3]).unwrap();
    tree.set(1, 0, 1, 1).unwrap();
    let mut ray = TraceRay::new(0, 0, 0, Vec3::new(-0.5, 1.5, 1.5), Vec3::new(1.0, 0.0, 0.0));
    assert!(tree.intersect(&mut ray, &opaque));
    assert!(approx(ray.distance, 0.5), "distance {}", ray.distance);
    assert_eq!(ray.normal, Vec3::new(-1.0, 0.0, 0.0));
}

#[test]
fn load_rejects_bad_depth() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&40i32.to_be_bytes());
    bytes.extend_from_slice(&1i32.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 24]);
    bytes.extend_from_slice(&0i32.to_be_bytes());
    assert!(matches!(
        PackedOctree::load(&mut bytes.as_slice()),
        Err(OctreeError::Malformed(_))
    ));
}

#[test]
fn load_rejects_dangling_branch() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&3i32.to_be_bytes());
    bytes.extend_from_slice(&1i32.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 24]);
    bytes.extend_from_slice(&1i32.to_be_bytes());
    assert!(matches!(
        PackedOctree::load(&mut bytes.as_slice()),
        Err(OctreeError::Malformed(_))
    ));
}

#[test]
fn load_reports_truncation_as_io() {
    let mut tree = PackedOctree::new(3, [1.0, 2.0, 3.0]).unwrap();
    tree.set(5, 1, 2, 3).unwrap();
    let mut bytes = Vec::new();
    tree.store(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 3);
    assert!(matches!(
        PackedOctree::load(&mut bytes.as_slice()),
        Err(OctreeError::Io(_))
    ));
}

#[test]
fn oversized_cell_count_fails_as_truncation() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&3i32.to_be_bytes());
    bytes.extend_from_slice(&(i32::MAX - 100).to_be_bytes());
    bytes.extend_from_slice(&[0u8; 24]);
    bytes.extend_from_slice(&[0u8; 12]);
    assert!(matches!(
        PackedOctree::load(&mut bytes.as_slice()),
        Err(OctreeError::Io(_))
    ));
}

#[test]
fn large_tree_loads_across_read_chunks() {
    let mut tree = PackedOctree::new(8, [128.0; 3]).unwrap();
    for x in (0..64).step_by(4) {
        for y in (0..64).step_by(4) {
            for z in (0..64).step_by(4) {
                tree.set(1 + (x + y + z) as u32 % 5, x, y, z).unwrap();
            }
        }
    }
    assert!(tree.size() > 1 << 16);
    let mut bytes = Vec::new();
    tree.store(&mut bytes).unwrap();
    let loaded = PackedOctree::load(&mut bytes.as_slice()).unwrap();
    assert_eq!(loaded, tree);
    assert_eq!(loaded.get(60, 0, 4), 1 + 64 % 5);
}

#[test]
fn stored_header_is_big_endian() {
    let tree = PackedOctree::new(7, [0.0, 0.0, 0.0]).unwrap();
    let mut bytes = Vec::new();
    tree.store(&mut bytes).unwrap();
    assert_eq!(&bytes[..8], &[0, 0, 0, 7, 0, 0, 0, 1]);
    assert_eq!(bytes.len(), 4 + 4 + 24 + 4);
}

#[test]
fn lineage_walks_back_to_the_primary_ray() {
    let primary = ray_down_z(1.0, 1.0);
    let bounce = primary.spawn_child().spawn_child();
    let depths: Vec<u32> = bounce.lineage().map(|r| r.depth).collect();
    assert_eq!(depths, vec![2, 1, 0]);
}
