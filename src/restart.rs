//! Checkpoint and restart files
//!
//! Every rank writes one text file per quantity, named
//! `<quantity>.<rank>.<timestep>.restart`, holding whitespace-separated
//! values with one line per local node or per local tetrahedron (elements
//! in local order, ten tets each). Material indices are written as whole
//! numbers and checked against the material table on reading.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::mechanics::tensor::SymTensor;
use crate::mesh::hexahedron::TETRA_PER_ELEMENT;
use crate::parallel::ReduceOp;
use crate::pipeline::Stage;

pub const COORD: &str = "coord";
pub const VELOCITY: &str = "vel";
pub const STRESS: &str = "stressTensor";
pub const STRAIN: &str = "strainTensor";
pub const PLASTIC_STRAIN: &str = "plasticStrain";
pub const DENSITY: &str = "density";
pub const MATERIAL: &str = "material";
pub const TEMPERATURE: &str = "temperature";
pub const VISCOSITY: &str = "viscosity";
pub const NODE_TEMPERATURE: &str = "nodeTemperature";
pub const TIME_STEP: &str = "timeStep";

/// Every quantity written to a checkpoint
pub const QUANTITIES: [&str; 11] = [
    COORD,
    VELOCITY,
    NODE_TEMPERATURE,
    STRESS,
    STRAIN,
    PLASTIC_STRAIN,
    DENSITY,
    MATERIAL,
    TEMPERATURE,
    VISCOSITY,
    TIME_STEP,
];

pub fn restart_path(directory: &Path, quantity: &str, rank: usize, timestep: u64) -> PathBuf {
    directory.join(format!("{}.{}.{}.restart", quantity, rank, timestep))
}

pub(crate) fn write_rows<'a, I>(path: &Path, rows: I) -> Result<()>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let file = fs::File::create(path).map_err(|e| Error::io(path, e))?;
    let mut w = BufWriter::new(file);
    for row in rows {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(w, "{}", line.join(" ")).map_err(|e| Error::io(path, e))?;
    }
    w.flush().map_err(|e| Error::io(path, e))
}

/// Read exactly `count` values from a restart file.
pub(crate) fn read_values(path: &Path, count: usize) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let values = text
        .split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|e| Error::io(path, io::Error::new(io::ErrorKind::InvalidData, format!("{:?}: {}", tok, e))))
        })
        .collect::<Result<Vec<f64>>>()?;
    if values.len() != count {
        return Err(Error::io(
            path,
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected {} values, found {}", count, values.len()),
            ),
        ));
    }
    Ok(values)
}

/// Convert stored material ids back to indices into a table of `count`.
fn material_indices(path: &Path, values: &[f64], count: usize) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|&v| {
            if v >= 0.0 && v.fract() == 0.0 && (v as usize) < count {
                Ok(v as usize)
            } else {
                Err(Error::io(
                    path,
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("material id {} outside the table of {}", v, count),
                    ),
                ))
            }
        })
        .collect()
}

/// Write the checkpoint of the current timestep for this rank.
///
/// # Errors
/// `Io` if the directory cannot be created or a file cannot be written.
pub fn write_checkpoint(ctx: &Context) -> Result<()> {
    let dir = &ctx.config.restart.directory;
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let rank = ctx.rank();
    let ts = ctx.timestep;
    let mesh = &ctx.mesh;
    let local_nodes = mesh.decomposition.local_nodes;
    let tets = || mesh.elements[..mesh.decomposition.local_elements].iter().flat_map(|el| el.tetra.iter());
    let path = |q: &str| restart_path(dir, q, rank, ts);

    write_rows(&path(COORD), mesh.coords[..local_nodes].iter().map(|p| p.coords.as_slice()))?;
    write_rows(&path(VELOCITY), mesh.nodes[..local_nodes].iter().map(|n| n.velocity.as_slice()))?;
    write_rows(
        &path(NODE_TEMPERATURE),
        mesh.nodes[..local_nodes].iter().map(|n| std::slice::from_ref(&n.temperature)),
    )?;
    write_rows(&path(STRESS), tets().map(|t| t.stress.as_slice()))?;
    write_rows(&path(STRAIN), tets().map(|t| t.strain.as_slice()))?;
    write_rows(&path(PLASTIC_STRAIN), tets().map(|t| std::slice::from_ref(&t.plastic_strain)))?;
    write_rows(&path(DENSITY), tets().map(|t| std::slice::from_ref(&t.density)))?;
    let materials: Vec<f64> = tets().map(|t| t.material as f64).collect();
    write_rows(&path(MATERIAL), materials.iter().map(std::slice::from_ref))?;
    write_rows(&path(TEMPERATURE), tets().map(|t| std::slice::from_ref(&t.temperature)))?;
    write_rows(&path(VISCOSITY), tets().map(|t| std::slice::from_ref(&t.viscosity)))?;
    let header = [ts as f64, ctx.time, ctx.dt, ctx.speed_of_sound, ctx.init_min_length_scale];
    write_rows(&path(TIME_STEP), [&header[..]])
}

/// Load the checkpoint written at `timestep` into the locally owned state.
///
/// Shadow entities are left for the next ghost synchronization.
///
/// # Errors
/// `Io` if a file is missing, unreadable or holds the wrong number of
/// values.
pub fn read_checkpoint(ctx: &mut Context, timestep: u64) -> Result<()> {
    let dir = ctx.config.restart.directory.clone();
    let rank = ctx.rank();
    let path = |q: &str| restart_path(&dir, q, rank, timestep);
    let local_nodes = ctx.mesh.decomposition.local_nodes;
    let local_elements = ctx.mesh.decomposition.local_elements;
    let n_tets = local_elements * TETRA_PER_ELEMENT;

    let coords = read_values(&path(COORD), 3 * local_nodes)?;
    let velocity = read_values(&path(VELOCITY), 3 * local_nodes)?;
    let node_temperature = read_values(&path(NODE_TEMPERATURE), local_nodes)?;
    let stress = read_values(&path(STRESS), 6 * n_tets)?;
    let strain = read_values(&path(STRAIN), 6 * n_tets)?;
    let plastic = read_values(&path(PLASTIC_STRAIN), n_tets)?;
    let density = read_values(&path(DENSITY), n_tets)?;
    let material_path = path(MATERIAL);
    let material = material_indices(&material_path, &read_values(&material_path, n_tets)?, ctx.materials.len())?;
    let temperature = read_values(&path(TEMPERATURE), n_tets)?;
    let viscosity = read_values(&path(VISCOSITY), n_tets)?;
    let header = read_values(&path(TIME_STEP), 5)?;

    let mesh = &mut ctx.mesh;
    for n in 0..local_nodes {
        mesh.coords[n].coords.copy_from_slice(&coords[3 * n..3 * n + 3]);
        mesh.nodes[n].velocity.copy_from_slice(&velocity[3 * n..3 * n + 3]);
        mesh.nodes[n].temperature = node_temperature[n];
    }
    let tets = mesh.elements[..local_elements].iter_mut().flat_map(|el| el.tetra.iter_mut());
    for (i, tet) in tets.enumerate() {
        tet.stress = SymTensor::from_column_slice(&stress[6 * i..6 * i + 6]);
        tet.strain = SymTensor::from_column_slice(&strain[6 * i..6 * i + 6]);
        tet.plastic_strain = plastic[i];
        tet.density = density[i];
        tet.material = material[i];
        tet.temperature = temperature[i];
        tet.viscosity = viscosity[i];
    }
    for el in mesh.elements[..local_elements].iter_mut() {
        let n = TETRA_PER_ELEMENT as f64;
        el.material = el.tetra[0].material;
        el.aps = el.tetra.iter().map(|t| t.plastic_strain).sum::<f64>() / n;
    }

    ctx.timestep = header[0] as u64;
    ctx.time = header[1];
    ctx.dt = header[2];
    ctx.speed_of_sound = header[3];
    ctx.init_min_length_scale = header[4];
    ctx.restarting = true;
    info!("rank {} restarted from timestep {} (t = {:.6e} s)", rank, ctx.timestep, ctx.time);
    Ok(())
}

/// Checkpoint stage: writes the restart files every checkpoint interval
///
/// Collective: the total mass in the log line is summed over all ranks.
#[derive(Debug, Default)]
pub struct Checkpoint;

impl Stage for Checkpoint {
    fn name(&self) -> &str {
        "checkpoint"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let interval = ctx.config.restart.checkpoint_interval;
        if interval == 0 || ctx.timestep % interval != 0 {
            return Ok(());
        }
        write_checkpoint(ctx)?;
        let local_mass = ctx.mesh.local_mass();
        let mass = ctx.comm.all_reduce(local_mass, ReduceOp::Sum)?;
        if ctx.rank() == 0 {
            info!(
                "checkpoint: step {}, time {:.6e} s, dt {:.4e} s, total mass {:.6e} kg",
                ctx.timestep, ctx.time, ctx.dt, mass
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let p = restart_path(Path::new("/tmp/run"), STRESS, 3, 120);
        assert_eq!(p, PathBuf::from("/tmp/run/stressTensor.3.120.restart"));
        assert_eq!(QUANTITIES.len(), 11);
    }

    #[test]
    fn test_value_count_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("density.0.1.restart");
        write_rows(&path, [&[1.0, 2.5][..], &[3.0][..]]).unwrap();
        assert_eq!(read_values(&path, 3).unwrap(), vec![1.0, 2.5, 3.0]);
        assert!(matches!(read_values(&path, 4), Err(Error::Io { .. })));
        assert!(matches!(read_values(&dir.path().join("missing"), 1), Err(Error::Io { .. })));
    }

    #[test]
    fn test_material_ids_are_checked() {
        let path = Path::new("material.0.1.restart");
        assert_eq!(material_indices(path, &[0.0, 2.0, 1.0], 3).unwrap(), vec![0, 2, 1]);
        assert!(matches!(material_indices(path, &[3.0], 3), Err(Error::Io { .. })));
        assert!(matches!(material_indices(path, &[0.5], 3), Err(Error::Io { .. })));
        assert!(matches!(material_indices(path, &[-1.0], 3), Err(Error::Io { .. })));
    }
}
