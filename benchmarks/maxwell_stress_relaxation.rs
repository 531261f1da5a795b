/// Validation Benchmark: Maxwell Stress Relaxation
///
/// **Problem Setup:**
/// - 2×2×2 box, every wall held at zero velocity
/// - Uniform initial shear stress σ_xy = σ₀, gravity off
/// - Constant timestep, Maxwell rheology with a fixed viscosity
///
/// **Analytical Solution:**
/// σ_xy(t) = σ₀ exp(-t/τ_M), τ_M = η/μ
///
/// The incremental update relaxes by (1 − θ)/(1 + θ) per step with
/// θ = μΔt/(2η), which converges to the exponential as Δt/τ_M → 0.
///
/// **Success Criteria:**
/// - <1% error against the exponential for Δt = τ_M/100

use anyhow::Result;
use geo_lagrangian::bc::Axis;
use geo_lagrangian::config::VelocityBcConfig;
use geo_lagrangian::mechanics::tensor::XY;
use geo_lagrangian::{DtPolicy, Material, Rheology, Simulation, SimulationConfig, SerialCommunicator, Wall};

const YEAR: f64 = 365.25 * 24.0 * 3600.0;

fn held_walls() -> Vec<VelocityBcConfig> {
    let mut bcs = Vec::new();
    for wall in Wall::ALL {
        for component in [Axis::X, Axis::Y, Axis::Z] {
            bcs.push(VelocityBcConfig {
                wall,
                component,
                function: "constant".to_string(),
                value: 0.0,
                ramp_time: 0.0,
            });
        }
    }
    bcs
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("═══════════════════════════════════════════════════════");
    println!("  Maxwell Viscoelasticity: Stress Relaxation Test");
    println!("═══════════════════════════════════════════════════════\n");

    let eta = 1e19;
    let mut material = Material::elastic(3e10, 3e10, 2700.0);
    material.rheology = Rheology::MAXWELL;
    material.viscosity.vis_min = eta;
    material.viscosity.vis_max = eta;
    let tau_m = eta / material.mu;

    let n_steps = 300;
    let dt = tau_m / 100.0;
    let sigma_0 = 1e7;

    println!("Material Properties:");
    println!("  Shear modulus μ:       {:.2e} Pa", material.mu);
    println!("  Viscosity η:           {:.2e} Pa·s", eta);
    println!("  Relaxation time τ_M:   {:.2e} s ({:.1} years)", tau_m, tau_m / YEAR);
    println!("  Δt:                    {:.2e} s ({:.3} τ_M)\n", dt, dt / tau_m);

    let mut config = SimulationConfig::unit_box(2, 2, 2);
    config.materials = vec![material];
    config.velocity_bc = held_walls();
    config.time_stepping.policy = DtPolicy::Constant;
    config.time_stepping.dt = Some(dt);
    config.time_stepping.gravity = 0.0;
    config.initial_conditions.temperature = config.materials[0].reference_temperature;

    let mut sim = Simulation::construct(config)?.build(Box::new(SerialCommunicator))?;
    sim.initialise()?;
    for el in sim.context_mut().mesh.elements.iter_mut() {
        for tet in el.tetra.iter_mut() {
            tet.stress[XY] = sigma_0;
        }
    }

    let mean_shear = |sim: &Simulation| {
        let elements = &sim.context().mesh.elements;
        let n = elements.len() * elements[0].tetra.len();
        elements.iter().flat_map(|el| el.tetra.iter()).map(|t| t.stress[XY]).sum::<f64>() / n as f64
    };

    let mut max_error = 0.0_f64;
    for step in 1..=n_steps {
        sim.step()?;
        let t = sim.context().time;
        let analytical = sigma_0 * (-t / tau_m).exp();
        let fem = mean_shear(&sim);
        let error = ((fem - analytical) / analytical * 100.0).abs();
        max_error = max_error.max(error);
        if step % 50 == 0 {
            println!(
                "  Step {:3}: t={:.2e} s ({:.2} τ_M), σ_xy={:.4e} Pa, analytical={:.4e} Pa, error={:.3}%",
                step,
                t,
                t / tau_m,
                fem,
                analytical,
                error
            );
        }
    }

    println!("\n═══════════════════════════════════════════════════════");
    println!("  Validation Results");
    println!("═══════════════════════════════════════════════════════\n");
    println!("  Maximum error: {:.3}%", max_error);
    if max_error < 1.0 {
        println!("  ✓ PASS: relaxation follows exp(-t/τ_M) within 1%");
    } else {
        println!("  ✗ FAIL: relaxation error above 1%");
    }
    sim.destroy()?;
    Ok(())
}
