//! Ghost synchronization of mesh state
//!
//! Owners pack their node or element state into flat buffers, the
//! negotiated [`GhostExchange`] moves them to the shadows, and shadows
//! unpack. Shadow element geometry is not sent; it is recomputed from the
//! synchronized coordinates, which gives the owner's values bit for bit.

use log::trace;
use nalgebra::Point3;

use super::communicator::Communicator;
use super::ghost::GhostExchange;
use crate::context::Context;
use crate::error::Result;
use crate::mesh::state::{ELEMENT_STRIDE, NODE_STRIDE};
use crate::pipeline::Stage;

/// Exchange a domain-indexed array of fixed-size rows.
pub fn exchange_rows<const N: usize>(
    comm: &mut dyn Communicator,
    exchange: &GhostExchange,
    rows: &mut [[f64; N]],
) -> Result<()> {
    let mut flat: Vec<f64> = rows.iter().flatten().copied().collect();
    exchange.exchange(comm, &mut flat, N)?;
    for (row, chunk) in rows.iter_mut().zip(flat.chunks_exact(N)) {
        row.copy_from_slice(chunk);
    }
    Ok(())
}

/// Exchange a domain-indexed array of points.
pub fn exchange_points(comm: &mut dyn Communicator, exchange: &GhostExchange, points: &mut [Point3<f64>]) -> Result<()> {
    let mut rows: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
    exchange_rows(comm, exchange, &mut rows)?;
    for (p, r) in points.iter_mut().zip(rows) {
        *p = Point3::from(r);
    }
    Ok(())
}

/// Copy owner node state and coordinates to every shadow node.
pub fn sync_nodes(ctx: &mut Context) -> Result<()> {
    let mesh = &mut ctx.mesh;
    let mut buf = Vec::with_capacity(mesh.num_nodes() * NODE_STRIDE);
    for (node, coord) in mesh.nodes.iter().zip(&mesh.coords) {
        node.pack(coord, &mut buf);
    }
    ctx.node_exchange.exchange(ctx.comm.as_mut(), &mut buf, NODE_STRIDE)?;
    for n in mesh.decomposition.local_nodes..mesh.num_nodes() {
        let values = &buf[n * NODE_STRIDE..(n + 1) * NODE_STRIDE];
        mesh.coords[n] = mesh.nodes[n].unpack(values);
    }
    trace!("rank {}: {} shadow nodes synchronized", ctx.comm.rank(), ctx.node_exchange.shadow_count());
    Ok(())
}

/// Copy owner element state to every shadow element and refresh the
/// shadow geometry.
///
/// # Errors
/// `Geometry` if a shadow element is inverted under the current coordinates.
pub fn sync_elements(ctx: &mut Context) -> Result<()> {
    let mesh = &mut ctx.mesh;
    let mut buf = Vec::with_capacity(mesh.num_elements() * ELEMENT_STRIDE);
    for el in &mesh.elements {
        el.pack(&mut buf);
    }
    ctx.element_exchange.exchange(ctx.comm.as_mut(), &mut buf, ELEMENT_STRIDE)?;
    for e in mesh.decomposition.local_elements..mesh.num_elements() {
        mesh.elements[e].unpack(&buf[e * ELEMENT_STRIDE..(e + 1) * ELEMENT_STRIDE]);
        mesh.update_element_geometry(e, ctx.timestep)?;
    }
    trace!("rank {}: {} shadow elements synchronized", ctx.comm.rank(), ctx.element_exchange.shadow_count());
    Ok(())
}

#[derive(Debug, Default)]
pub struct SyncNodes;

impl Stage for SyncNodes {
    fn name(&self) -> &str {
        "sync_nodes"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        sync_nodes(ctx)
    }
}

#[derive(Debug, Default)]
pub struct SyncElements;

impl Stage for SyncElements {
    fn name(&self) -> &str {
        "sync_elements"
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        sync_elements(ctx)
    }
}
