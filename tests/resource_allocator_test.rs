//! Integration tests for the multi-resource allocator.
//!
//! Covers:
//! 1. Randomized allocate/release sequences return the pool to full capacity
//! 2. Grants never exceed the request or the pool
//! 3. Concurrent callers never over-allocate a kind

use std::sync::{Arc, Barrier};
use std::thread;

use migration_scheduler::core::{
    default_capacities, Allocation, Grant, Resource, ResourceAllocator, ResourceMap,
};
use rand::Rng;

fn request(pairs: &[(Resource, u64)]) -> ResourceMap {
    pairs.iter().copied().collect()
}

#[test]
fn test_random_balanced_sequence_restores_pool() {
    let pool = ResourceAllocator::default();
    let capacity = default_capacities();
    let mut rng = rand::rng();
    let mut outstanding: Vec<Grant> = Vec::new();

    for step in 0..2_000 {
        if !outstanding.is_empty() && rng.random_bool(0.45) {
            let index = rng.random_range(0..outstanding.len());
            pool.release(outstanding.swap_remove(index));
        } else {
            let wanted = request(&[
                (Resource::TransferJob, rng.random_range(1..=3)),
                (Resource::TransferWorker, rng.random_range(1..=12)),
            ]);
            match pool.allocate(&format!("action-{step}"), &wanted) {
                Allocation::Granted(grant) => {
                    for (resource, amount) in grant.resources() {
                        assert!(*amount > 0);
                        assert!(*amount <= wanted[resource]);
                    }
                    outstanding.push(grant);
                }
                Allocation::Refused { resource } => {
                    assert!(wanted.contains_key(&resource));
                }
            }
        }

        for resource in Resource::ALL {
            let held: u64 = outstanding.iter().map(|g| g.get(resource)).sum();
            assert_eq!(pool.available(resource) + held, capacity[&resource]);
        }
    }

    for grant in outstanding.drain(..) {
        pool.release(grant);
    }
    assert_eq!(pool.snapshot().available, capacity);
}

#[test]
fn test_concurrent_allocations_respect_capacity() {
    let pool = Arc::new(ResourceAllocator::default());
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                match pool.allocate(&format!("job-{i}"), &request(&[(Resource::TransferJob, 1)])) {
                    Allocation::Granted(grant) => Some(grant),
                    Allocation::Refused { .. } => None,
                }
            })
        })
        .collect();

    let grants: Vec<Grant> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(grants.len(), 5);
    assert_eq!(pool.available(Resource::TransferJob), 0);

    for grant in grants {
        pool.release(grant);
    }
    assert_eq!(pool.available(Resource::TransferJob), 5);
}

#[test]
fn test_concurrent_partial_grants_sum_to_capacity() {
    let pool = Arc::new(ResourceAllocator::default());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.allocate(&format!("job-{i}"), &request(&[(Resource::TransferWorker, 7)]))
            })
        })
        .collect();

    let granted: u64 = handles
        .into_iter()
        .filter_map(|h| match h.join().unwrap() {
            Allocation::Granted(grant) => Some(grant.get(Resource::TransferWorker)),
            Allocation::Refused { .. } => None,
        })
        .sum();

    assert_eq!(granted, 25);
    assert_eq!(pool.available(Resource::TransferWorker), 0);
}

#[test]
fn test_update_resets_availability() {
    let pool = ResourceAllocator::default();
    let grant = pool
        .allocate("a1", &request(&[(Resource::MetadataOperation, 4)]))
        .into_result("a1")
        .unwrap();

    pool.update(Resource::MetadataOperation, 20);
    assert_eq!(pool.available(Resource::MetadataOperation), 20);

    pool.release(grant);
    let stats = pool.snapshot();
    assert_eq!(stats.capacity[&Resource::MetadataOperation], 20);
    assert_eq!(stats.available[&Resource::MetadataOperation], 24);
}
