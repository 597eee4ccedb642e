use std::path::Path;

use strata_octree::VoxelStore;
use strata_shard::{IndexConfig, IndexError, ShardedVoxelIndex};

fn index(total: u32, shard: u32, dir: &Path) -> ShardedVoxelIndex {
    ShardedVoxelIndex::new(
        total,
        IndexConfig {
            shard_depth: shard,
            scratch_dir: Some(dir.to_path_buf()),
        },
    )
    .unwrap()
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[test]
fn reading_empty_space_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(8, 3, dir.path());
    assert_eq!(idx.read(10, 20, 30), 0);
    assert_eq!(idx.read_with_level(10, 20, 30), (0, 8));
    assert_eq!(idx.shard_count(), 0);
    assert_eq!(idx.resident_shard(), None);
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn air_over_empty_space_allocates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(8, 3, dir.path());
    idx.write(0, 1, 2, 3).unwrap();
    assert_eq!(idx.shard_count(), 0);
}

#[test]
fn empty_neighbour_reports_coarse_level() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(6, 2, dir.path());
    idx.write(1, 0, 0, 0).unwrap();
    // Sibling shard cube at coarse level 0 spans 2^2 voxels.
    assert_eq!(idx.read_with_level(4, 0, 0), (0, 2));
    // The far half of the world is still one coarse leaf.
    assert_eq!(idx.read_with_level(40, 40, 40), (0, 5));
}

#[test]
fn in_shard_level_has_no_coarse_offset() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(8, 3, dir.path());
    idx.write(4, 9, 9, 9).unwrap();
    assert_eq!(idx.read_with_level(9, 9, 9), (4, 0));
    // Untouched octant inside the same shard.
    assert_eq!(idx.read_with_level(15, 15, 15), (0, 2));
}

#[test]
fn evicted_shards_reload_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(8, 3, dir.path());
    idx.write(1, 0, 0, 0).unwrap();
    idx.write(2, 100, 0, 0).unwrap();
    assert_eq!(idx.shard_count(), 2);
    assert_eq!(idx.resident_shard(), Some(2));

    assert_eq!(idx.read(0, 0, 0), 1);
    assert_eq!(idx.resident_shard(), Some(1));
    assert_eq!(idx.read(100, 0, 0), 2);

    let stats = idx.stats();
    assert_eq!(stats.shards, 2);
    assert_eq!(stats.shard_flushes, 2);
    assert_eq!(stats.shard_loads, 2);
    assert_eq!(files_in(dir.path()), 2);
}

#[test]
fn clean_shard_is_not_flushed_again() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(8, 3, dir.path());
    idx.write(1, 0, 0, 0).unwrap();
    idx.write(2, 100, 0, 0).unwrap();
    idx.read(0, 0, 0);
    idx.read(100, 0, 0);
    idx.read(0, 0, 0);
    assert_eq!(idx.stats().shard_flushes, 2);
}

#[test]
fn node_count_spans_coarse_and_shards() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(4, 2, dir.path());
    assert_eq!(idx.node_count(), 1);
    idx.write(1, 0, 0, 0).unwrap();
    // Coarse: 2 branches + 14 empty leaves; shard: root + 2 levels of 8.
    assert_eq!(idx.node_count(), 2 + 14 + 17);
    // A second shard evicts the first, which is then counted from disk.
    idx.write(1, 15, 15, 15).unwrap();
    assert_eq!(idx.resident_shard(), Some(2));
    assert_eq!(idx.node_count(), 3 + 20 + 17 + 17);
}

#[test]
fn finalize_seals_and_orders_shards() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(8, 3, dir.path());
    idx.write(3, 200, 1, 1).unwrap();
    idx.write(4, 1, 1, 1).unwrap();
    idx.write(5, 1, 200, 1).unwrap();

    let set = idx.finalize_for_tracing().unwrap();
    assert!(idx.is_sealed());
    assert_eq!(idx.resident_shard(), None);
    let ids: Vec<u32> = set.iter().map(|f| f.id()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(set.get(2).unwrap().load().unwrap().get(1, 200, 1), 5);

    assert!(matches!(idx.write(9, 1, 1, 1), Err(IndexError::Sealed)));
    assert_eq!(idx.read(1, 1, 1), 4);
    assert_eq!(idx.read(200, 1, 1), 3);
}

#[test]
fn shard_files_outlive_index_while_set_is_held() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(8, 3, dir.path());
    idx.write(3, 1, 1, 1).unwrap();
    let set = idx.finalize_for_tracing().unwrap();
    drop(idx);
    assert_eq!(files_in(dir.path()), 1);
    assert_eq!(set.get(0).unwrap().load().unwrap().get(1, 1, 1), 3);
    drop(set);
    assert_eq!(files_in(dir.path()), 0);
}

#[test]
fn corrupt_shard_reads_as_air() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(8, 3, dir.path());
    idx.write(3, 1, 1, 1).unwrap();
    let set = idx.finalize_for_tracing().unwrap();
    std::fs::write(set.get(0).unwrap().path(), b"not a shard").unwrap();

    assert_eq!(idx.read(1, 1, 1), 0);
    assert_eq!(idx.read_with_level(1, 1, 1), (0, 0));
    assert_eq!(idx.stats().failed_reads, 2);
    assert_eq!(idx.resident_shard(), None);
}

#[test]
fn failed_flush_keeps_the_dirty_shard_for_retry() {
    let root = tempfile::tempdir().unwrap();
    let scratch = root.path().join("shards");
    let mut idx = index(8, 3, &scratch);
    idx.write(7, 1, 1, 1).unwrap();

    // Allocating a second shard must flush the first, which now fails.
    std::fs::remove_dir_all(&scratch).unwrap();
    idx.write(4, 10, 1, 1).unwrap();
    let stats = idx.stats();
    assert_eq!(stats.dropped_writes, 1);
    assert_eq!(stats.shard_flushes, 0);
    assert_eq!(idx.shard_count(), 1);
    assert_eq!(idx.resident_shard(), Some(1));

    // The resident tree survived and the next eviction flushes it.
    std::fs::create_dir_all(&scratch).unwrap();
    idx.write(5, 2, 1, 1).unwrap();
    idx.write(3, 10, 1, 1).unwrap();
    assert_eq!(idx.resident_shard(), Some(2));
    assert_eq!(idx.stats().shard_flushes, 1);

    assert_eq!(idx.read(1, 1, 1), 7);
    assert_eq!(idx.read(2, 1, 1), 5);
    assert_eq!(idx.read(10, 1, 1), 3);
    assert_eq!(idx.stats().dropped_writes, 1);
}

#[test]
fn stream_load_is_unsupported() {
    let mut input: &[u8] = &[0, 0, 0, 4];
    assert!(matches!(
        ShardedVoxelIndex::load(&mut input, IndexConfig::default()),
        Err(IndexError::Unsupported)
    ));
}

#[test]
fn rejects_zero_shard_depth() {
    let dir = tempfile::tempdir().unwrap();
    let res = ShardedVoxelIndex::new(
        8,
        IndexConfig {
            shard_depth: 0,
            scratch_dir: Some(dir.path().to_path_buf()),
        },
    );
    assert!(matches!(res, Err(IndexError::InvalidDepth(0))));
}

#[test]
fn oversized_type_is_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let mut idx = index(8, 3, dir.path());
    assert!(matches!(
        idx.write(u32::MAX, 0, 0, 0),
        Err(IndexError::InvalidType(_))
    ));
    assert_eq!(idx.shard_count(), 0);
}
