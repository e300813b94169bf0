//! Quota convergence under stable asymmetric device throughput.

use std::thread;
use std::time::Duration;

use balancer_rs::{ComputeDevice, GrainOfWork, LoadBalancer, SMOOTHING_WINDOW};

#[derive(Clone, Copy)]
struct Dev {
    cost_ms: u64,
}

/// A device that is 3x slower per grain should converge to roughly a third
/// of the fast device's quota, and the partition always stays complete.
#[test]
fn asymmetric_devices_converge_to_throughput_ratio() {
    const GRAINS: usize = 20;

    let mut balancer = LoadBalancer::<Dev, ()>::new();
    balancer.add_device(ComputeDevice::new(Dev { cost_ms: 1 }));
    balancer.add_device(ComputeDevice::new(Dev { cost_ms: 3 }));

    for _ in 0..GRAINS {
        balancer.add_work(GrainOfWork::from_compute((), |dev: Dev, _: &mut ()| {
            thread::sleep(Duration::from_millis(dev.cost_ms));
        }));
    }

    // The smoothing window has to fill with post-measurement rows before
    // the quota settles; run twice that many rounds.
    for _ in 0..(SMOOTHING_WINDOW * 2) {
        balancer.run(false);
        assert_eq!(balancer.quotas().iter().sum::<usize>(), GRAINS);
    }

    let quotas = balancer.quotas();
    // Ideal split is 15/5; leave room for scheduling noise.
    assert!(
        (13..=17).contains(&quotas[0]),
        "fast device quota {} should be near 15 of {GRAINS}",
        quotas[0]
    );
    assert_eq!(quotas[0] + quotas[1], GRAINS);

    let shares = balancer.relative_performances();
    assert!(
        shares[0] > 2.0 * shares[1],
        "measured shares should favor the fast device: {shares:?}"
    );
}

/// A device's measurement only updates on rounds where it received work;
/// the bias keeps an idle device from vanishing permanently.
#[test]
fn zero_quota_device_keeps_positive_share() {
    const GRAINS: usize = 4;

    let mut balancer = LoadBalancer::<Dev, ()>::new();
    balancer.add_device(ComputeDevice::new(Dev { cost_ms: 0 }));
    balancer.add_device(ComputeDevice::new(Dev { cost_ms: 8 }));

    for _ in 0..GRAINS {
        balancer.add_work(GrainOfWork::from_compute((), |dev: Dev, _: &mut ()| {
            if dev.cost_ms > 0 {
                thread::sleep(Duration::from_millis(dev.cost_ms));
            }
        }));
    }

    // With so few grains and a huge speed gap the slow device is driven to
    // quota zero on some rounds; its share must still stay positive.
    for _ in 0..(SMOOTHING_WINDOW * 3) {
        balancer.run(false);
        assert_eq!(balancer.quotas().iter().sum::<usize>(), GRAINS);
    }

    let shares = balancer.relative_performances();
    assert!(shares[1] > 0.0, "idle device share must stay positive");
    assert!(shares[0] > shares[1]);
}
