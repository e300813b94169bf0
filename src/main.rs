//! Demonstration driver: simulated heterogeneous GPUs.
//!
//! Two configurations, mirroring the library's two grain forms:
//!
//! - `single`: six devices whose per-grain cost is `3 + gpu` ms,
//!   single-phase grains. Watch the quota converge toward the fast devices
//!   over ten rounds.
//! - `five`: a thousand five-phase grains moving 5-element pixel buffers
//!   through simulated device memory, with a `2 + gpu` ms sync to model
//!   GPUs of different generations, twenty rounds.

use std::collections::HashMap;
use std::env;
use std::thread;
use std::time::Duration;

use balancer_rs::{ComputeDevice, GrainOfWork, LoadBalancer};

fn main() {
    let mut run_single = true;
    let mut run_five = true;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--single" => {
                run_five = false;
            }
            "--five" => {
                run_single = false;
            }
            "--help" | "-h" => {
                eprintln!("usage: balancer-rs [--single | --five]");
                return;
            }
            other => {
                eprintln!("unknown flag: {other}");
                std::process::exit(2);
            }
        }
    }

    if run_single {
        single_phase_demo();
    }
    if run_five {
        five_phase_demo();
    }
}

fn print_round(round: usize, elapsed_ns: u64, shares: &[f64]) {
    let shares = shares
        .iter()
        .map(|s| format!("{s:5.1}%"))
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "round {round:2}: {:8.3} ms   performance {shares}",
        elapsed_ns as f64 / 1e6
    );
}

/// Single-phase grains: only a compute callback, cost depends on which
/// device runs it.
fn single_phase_demo() {
    const DEVICES: u64 = 6;
    const GRAINS: usize = 20;
    const ROUNDS: usize = 10;

    println!("== single-phase: {GRAINS} grains over {DEVICES} devices ==");

    #[derive(Clone, Copy)]
    struct Gpu {
        id: u64,
    }

    let mut balancer = LoadBalancer::<Gpu, ()>::new();
    for id in 0..DEVICES {
        balancer.add_device(ComputeDevice::new(Gpu { id }));
    }
    for _ in 0..GRAINS {
        balancer.add_work(GrainOfWork::from_compute((), |gpu: Gpu, _: &mut ()| {
            thread::sleep(Duration::from_millis(3 + gpu.id));
        }));
    }

    for round in 0..ROUNDS {
        let elapsed = balancer.run(false);
        print_round(round, elapsed, &balancer.relative_performances());
    }
    println!("final quotas: {:?}", balancer.quotas());
}

/// Five-phase grains shuttling simulated pixel buffers through per-device
/// memory, with heterogeneous sync costs.
fn five_phase_demo() {
    const DEVICES: u64 = 6;
    const GRAINS: usize = 1000;
    const PIXELS_PER_GRAIN: usize = 5;
    const ROUNDS: usize = 20;

    println!("== five-phase: {GRAINS} grains x {PIXELS_PER_GRAIN} pixels over {DEVICES} devices ==");

    #[derive(Clone, Copy)]
    struct DeviceState {
        gpu_id: u64,
    }

    #[derive(Default)]
    struct GrainState {
        /// Which device ran this grain's output phase most recently.
        last_device: Option<u64>,
        /// Simulated per-device video-memory buffers.
        input_dev: HashMap<u64, Vec<f32>>,
        output_dev: HashMap<u64, Vec<f32>>,
        /// Results copied back to the host by the output phase.
        host_result: Vec<f32>,
    }

    let mut balancer = LoadBalancer::<DeviceState, GrainState>::new();
    for gpu_id in 0..DEVICES {
        balancer.add_device(ComputeDevice::new(DeviceState { gpu_id }));
    }

    let mut handles = Vec::with_capacity(GRAINS);
    for i in 0..GRAINS {
        let host_input: Vec<f32> = (0..PIXELS_PER_GRAIN)
            .map(|j| ((i * PIXELS_PER_GRAIN + j) & 255) as f32)
            .collect();

        let grain = GrainOfWork::new(
            GrainState::default(),
            // init: allocate this device's buffers, once per device.
            |gpu: DeviceState, grain: &mut GrainState| {
                grain
                    .input_dev
                    .insert(gpu.gpu_id, vec![0.0; PIXELS_PER_GRAIN]);
                grain
                    .output_dev
                    .insert(gpu.gpu_id, vec![0.0; PIXELS_PER_GRAIN]);
            },
            // input: host -> device copy.
            move |gpu: DeviceState, grain: &mut GrainState| {
                let buffer = grain
                    .input_dev
                    .get_mut(&gpu.gpu_id)
                    .expect("init allocated this device's input buffer");
                buffer.copy_from_slice(&host_input);
            },
            // compute: a stand-in for a kernel launch.
            |gpu: DeviceState, grain: &mut GrainState| {
                let pixels: Vec<f32> = grain.input_dev[&gpu.gpu_id]
                    .iter()
                    .map(|value| 0.5 * value)
                    .collect();
                grain.output_dev.insert(gpu.gpu_id, pixels);
            },
            // output: device -> host copy.
            |gpu: DeviceState, grain: &mut GrainState| {
                grain.host_result = grain.output_dev[&gpu.gpu_id].clone();
                grain.last_device = Some(gpu.gpu_id);
            },
            // sync: bigger gpu_id simulates a slower generation.
            |gpu: DeviceState, _: &mut GrainState| {
                thread::sleep(Duration::from_millis(2 + gpu.gpu_id));
            },
        );

        handles.push(grain.clone());
        balancer.add_work(grain);
    }

    for round in 0..ROUNDS {
        let elapsed = balancer.run(false);
        print_round(round, elapsed, &balancer.relative_performances());
    }
    println!("final quotas: {:?}", balancer.quotas());

    println!("first results:");
    for handle in handles.iter().take(5) {
        let (device, pixels) =
            handle.with_state(|state| (state.last_device, state.host_result.clone()));
        println!("  device {device:?}: {pixels:?}");
    }
}
