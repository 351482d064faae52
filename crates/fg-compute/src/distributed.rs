//! Distributed row application over a fixed process group.
//!
//! The group is reached through the [`Communicator`] trait: rank, size and
//! blocking collectives over row matrices. An MPI binding is an external
//! collaborator implementing the trait; [`LocalCommunicator`] is the
//! in-process, channel-backed implementation used for tests and
//! single-host runs.
//!
//! One call performs exactly one scatter and one gather (plus a final
//! result broadcast so every rank observes the full ordered result). Rows
//! are split along the leading dimension as evenly as possible, remainder
//! rows going to the lowest ranks. Shape disagreements are fatal
//! configuration errors, never retried.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use fg_core::{Error, Result};

use crate::progress::Progress;

/// Rank of the coordinating process.
pub const ROOT: usize = 0;

/// Blocking collectives over a fixed group of cooperating processes.
///
/// All methods are collective: every rank of the group must call them in
/// the same order. Arguments marked root-only are ignored on other ranks.
pub trait Communicator: Send + Sync {
    /// This process's rank, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of cooperating processes in the group.
    fn size(&self) -> usize;

    /// Broadcast a count from the root. `value` is root-only.
    fn broadcast_usize(&self, value: usize) -> Result<usize>;

    /// Scatter rows across the group.
    ///
    /// `send` is root-only: the full row matrix plus the per-rank row
    /// counts. Returns this rank's shard.
    fn scatter_rows(&self, send: Option<(Vec<Vec<f64>>, Vec<usize>)>) -> Result<Vec<Vec<f64>>>;

    /// Gather shards onto the root in rank order.
    ///
    /// Returns `Some(rows)` on the root, `None` elsewhere.
    fn gather_rows(&self, local: Vec<Vec<f64>>) -> Result<Option<Vec<Vec<f64>>>>;

    /// Broadcast rows from the root. `rows` is root-only.
    fn broadcast_rows(&self, rows: Option<Vec<Vec<f64>>>) -> Result<Vec<Vec<f64>>>;
}

/// Per-rank row counts for scattering `n_rows` over `size` ranks.
///
/// Every rank receives `n_rows / size` rows; the `n_rows % size` remainder
/// rows are assigned one each to the lowest ranks.
pub fn scatter_layout(n_rows: usize, size: usize) -> Vec<usize> {
    let base = n_rows / size;
    let rem = n_rows % size;
    (0..size).map(|rank| base + usize::from(rank < rem)).collect()
}

/// Apply `f` to every row, scattered across the communicator group.
///
/// `f` must be a pure mapping from one fixed-width row to another
/// fixed-width row; width uniformity is what makes the scatter/gather
/// byte-accounting well-defined, and violations fail the whole call with
/// [`Error::Distributed`]. Only the root renders progress. Every rank
/// returns the full result in original row order.
pub fn distributed_apply<F>(
    comm: &dyn Communicator,
    f: F,
    rows: &[Vec<f64>],
    label: &str,
) -> Result<Vec<Vec<f64>>>
where
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    let size = comm.size();
    if size == 0 {
        return Err(Error::Distributed("communicator group is empty".into()));
    }
    let rank = comm.rank();

    // The root's copy of the input is authoritative; its row width is
    // broadcast so every rank can validate the shard it receives.
    let width = if rank == ROOT { uniform_width(rows)? } else { 0 };
    let width = comm.broadcast_usize(width)?;
    let send = if rank == ROOT {
        Some((rows.to_vec(), scatter_layout(rows.len(), size)))
    } else {
        None
    };

    let local = comm.scatter_rows(send)?;
    for (i, row) in local.iter().enumerate() {
        if row.len() != width {
            return Err(Error::Distributed(format!(
                "rank {} received row {} with width {} but the scattered width is {}",
                rank,
                i,
                row.len(),
                width,
            )));
        }
    }

    let progress =
        if rank == ROOT { Progress::new(label, local.len()) } else { Progress::hidden() };
    let mut out_local: Vec<Vec<f64>> = Vec::with_capacity(local.len());
    let mut out_width: Option<usize> = None;
    for row in &local {
        let out = f(row)?;
        match out_width {
            None => out_width = Some(out.len()),
            Some(w) if w != out.len() => {
                return Err(Error::Distributed(format!(
                    "function output width changed from {} to {} within one shard",
                    w,
                    out.len(),
                )));
            }
            Some(_) => {}
        }
        out_local.push(out);
        progress.tick();
    }
    progress.finish();

    let gathered = comm.gather_rows(out_local)?;
    if let Some(all) = &gathered {
        // Root re-checks width uniformity across shard boundaries.
        uniform_width(all)?;
    }
    comm.broadcast_rows(gathered)
}

fn uniform_width(rows: &[Vec<f64>]) -> Result<usize> {
    let width = rows.first().map_or(0, Vec::len);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(Error::Distributed(format!(
                "row {} has width {} but row 0 has width {}",
                i,
                row.len(),
                width,
            )));
        }
    }
    Ok(width)
}

// ---------------------------------------------------------------------------
// In-process communicator
// ---------------------------------------------------------------------------

enum Packet {
    Count(usize),
    Rows(Vec<Vec<f64>>),
}

/// Channel-backed [`Communicator`] connecting threads within one process.
///
/// [`LocalCommunicator::group`] returns one endpoint per rank; hand each to
/// its own thread and run the same collective sequence on all of them, as
/// an MPI program would. Every root<->rank direction has its own channel
/// and the root keeps its own share without any loopback send, so packets
/// from one collective can never be mistaken for another's.
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    /// rank -> root (unused on the root itself).
    to_root: Sender<Packet>,
    /// root -> this rank (unused on the root itself).
    from_root: Mutex<Receiver<Packet>>,
    /// Root only: root -> rank senders, indexed by rank (entry 0 unused).
    to_ranks: Vec<Sender<Packet>>,
    /// Root only: rank -> root receivers, indexed by rank (entry 0 unused).
    from_ranks: Vec<Mutex<Receiver<Packet>>>,
}

impl LocalCommunicator {
    /// Create a connected group of `size` endpoints.
    pub fn group(size: usize) -> Vec<LocalCommunicator> {
        assert!(size > 0, "group size must be at least 1");
        let mut to_ranks = Vec::with_capacity(size);
        let mut from_root_rxs = Vec::with_capacity(size);
        let mut to_root_txs = Vec::with_capacity(size);
        let mut from_ranks = Vec::with_capacity(size);
        for _ in 0..size {
            let (down_tx, down_rx) = channel();
            to_ranks.push(down_tx);
            from_root_rxs.push(down_rx);
            let (up_tx, up_rx) = channel();
            to_root_txs.push(up_tx);
            from_ranks.push(Mutex::new(up_rx));
        }

        let mut endpoints = Vec::with_capacity(size);
        for (rank, (from_root, to_root)) in
            from_root_rxs.into_iter().zip(to_root_txs.into_iter()).enumerate()
        {
            endpoints.push(LocalCommunicator {
                rank,
                size,
                to_root,
                from_root: Mutex::new(from_root),
                to_ranks: if rank == ROOT { to_ranks.clone() } else { Vec::new() },
                from_ranks: Vec::new(),
            });
        }
        endpoints[ROOT].from_ranks = from_ranks;
        endpoints
    }

    fn send_down(&self, rank: usize, packet: Packet) -> Result<()> {
        self.to_ranks[rank]
            .send(packet)
            .map_err(|_| Error::Distributed(format!("rank {} has left the group", rank)))
    }

    fn recv_from_root(&self) -> Result<Packet> {
        let rx = self
            .from_root
            .lock()
            .map_err(|_| Error::Distributed("communicator inbox poisoned".into()))?;
        rx.recv()
            .map_err(|_| Error::Distributed("communicator group disconnected".into()))
    }

    fn recv_from_rank(&self, rank: usize) -> Result<Packet> {
        let rx = self.from_ranks[rank]
            .lock()
            .map_err(|_| Error::Distributed("communicator inbox poisoned".into()))?;
        rx.recv().map_err(|_| {
            Error::Distributed(format!("rank {} disconnected before sending", rank))
        })
    }

    fn expect_count(packet: Packet) -> Result<usize> {
        match packet {
            Packet::Count(v) => Ok(v),
            Packet::Rows(_) => Err(Error::Distributed("expected a count, got rows".into())),
        }
    }

    fn expect_rows(packet: Packet) -> Result<Vec<Vec<f64>>> {
        match packet {
            Packet::Rows(rows) => Ok(rows),
            Packet::Count(_) => Err(Error::Distributed("expected rows, got a count".into())),
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast_usize(&self, value: usize) -> Result<usize> {
        if self.rank == ROOT {
            for rank in 1..self.size {
                self.send_down(rank, Packet::Count(value))?;
            }
            return Ok(value);
        }
        Self::expect_count(self.recv_from_root()?)
    }

    fn scatter_rows(&self, send: Option<(Vec<Vec<f64>>, Vec<usize>)>) -> Result<Vec<Vec<f64>>> {
        if self.rank != ROOT {
            return Self::expect_rows(self.recv_from_root()?);
        }
        let (mut rows, counts) = send.ok_or_else(|| {
            Error::Distributed("scatter called on the root without data".into())
        })?;
        if counts.len() != self.size {
            return Err(Error::Distributed(format!(
                "scatter counts length {} != group size {}",
                counts.len(),
                self.size,
            )));
        }
        let total: usize = counts.iter().sum();
        if total != rows.len() {
            return Err(Error::Distributed(format!(
                "scatter counts sum to {} but there are {} rows",
                total,
                rows.len(),
            )));
        }
        // Highest ranks are split off the tail first so each shard is a
        // contiguous block in rank order.
        let mut shards: Vec<Vec<Vec<f64>>> = Vec::with_capacity(self.size);
        for &count in counts.iter().rev() {
            let shard = rows.split_off(rows.len() - count);
            shards.push(shard);
        }
        shards.reverse();
        let mut own = Vec::new();
        for (rank, shard) in shards.into_iter().enumerate() {
            if rank == ROOT {
                own = shard;
            } else {
                self.send_down(rank, Packet::Rows(shard))?;
            }
        }
        Ok(own)
    }

    fn gather_rows(&self, local: Vec<Vec<f64>>) -> Result<Option<Vec<Vec<f64>>>> {
        if self.rank != ROOT {
            self.to_root
                .send(Packet::Rows(local))
                .map_err(|_| Error::Distributed("the root has left the group".into()))?;
            return Ok(None);
        }
        let mut all = local;
        for rank in 1..self.size {
            all.extend(Self::expect_rows(self.recv_from_rank(rank)?)?);
        }
        Ok(Some(all))
    }

    fn broadcast_rows(&self, rows: Option<Vec<Vec<f64>>>) -> Result<Vec<Vec<f64>>> {
        if self.rank != ROOT {
            return Self::expect_rows(self.recv_from_root()?);
        }
        let rows = rows.ok_or_else(|| {
            Error::Distributed("broadcast called on the root without data".into())
        })?;
        for rank in 1..self.size {
            self.send_down(rank, Packet::Rows(rows.clone()))?;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scatter_layout_even_split() {
        assert_eq!(scatter_layout(12, 4), vec![3, 3, 3, 3]);
    }

    #[test]
    fn test_scatter_layout_remainder_to_low_ranks() {
        assert_eq!(scatter_layout(10, 3), vec![4, 3, 3]);
        assert_eq!(scatter_layout(7, 5), vec![2, 2, 1, 1, 1]);
        assert_eq!(scatter_layout(2, 5), vec![1, 1, 0, 0, 0]);
    }

    #[test]
    fn test_scatter_layout_sums_to_total() {
        for n in 0..40 {
            for size in 1..8 {
                let counts = scatter_layout(n, size);
                assert_eq!(counts.iter().sum::<usize>(), n, "n={n} size={size}");
            }
        }
    }

    fn run_group<F>(size: usize, rows: Vec<Vec<f64>>, f: F) -> Vec<Result<Vec<Vec<f64>>>>
    where
        F: Fn(&[f64]) -> Result<Vec<f64>> + Copy + Send,
    {
        let comms = LocalCommunicator::group(size);
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let rows = rows.clone();
                    s.spawn(move || distributed_apply(&comm, f, &rows, "test"))
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("worker panicked")).collect()
        })
    }

    fn double_row(row: &[f64]) -> Result<Vec<f64>> {
        Ok(row.iter().map(|v| v * 2.0).collect())
    }

    #[test]
    fn test_distributed_matches_reference_across_group_sizes() {
        // Lengths deliberately not divisible by the group sizes.
        for &size in &[1usize, 2, 3, 5] {
            for &n in &[1usize, 7, 10, 13] {
                let rows: Vec<Vec<f64>> =
                    (0..n).map(|i| vec![i as f64, 10.0 + i as f64]).collect();
                let expected: Vec<Vec<f64>> =
                    rows.iter().map(|r| double_row(r).unwrap()).collect();
                let results = run_group(size, rows, double_row);
                for (rank, result) in results.into_iter().enumerate() {
                    let got = result.unwrap();
                    assert_eq!(got, expected, "size={size} n={n} rank={rank}");
                }
            }
        }
    }

    #[test]
    fn test_distributed_empty_input() {
        let results = run_group(3, Vec::new(), double_row);
        for result in results {
            assert!(result.unwrap().is_empty());
        }
    }

    #[test]
    fn test_distributed_rejects_ragged_rows() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let comms = LocalCommunicator::group(1);
        let result = distributed_apply(&comms[0], double_row, &rows, "ragged");
        assert!(matches!(result, Err(Error::Distributed(_))));
    }

    #[test]
    fn test_distributed_rejects_ragged_output() {
        let rows: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64]).collect();
        let comms = LocalCommunicator::group(1);
        let result = distributed_apply(
            &comms[0],
            |row| Ok(vec![0.0; 1 + row[0] as usize]),
            &rows,
            "ragged-out",
        );
        assert!(matches!(result, Err(Error::Distributed(_))));
    }

    #[test]
    fn test_broadcast_usize() {
        let comms = LocalCommunicator::group(3);
        let got: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    s.spawn(move || {
                        let value = if comm.rank() == ROOT { 42 } else { 0 };
                        comm.broadcast_usize(value).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(got, vec![42, 42, 42]);
    }
}
