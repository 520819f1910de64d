use futures::future::BoxFuture;
use tracing::debug;
use crate::error::{Error, Result};
use crate::tensor::HostArray;

/// A contiguous row range `[start, end)` of one prediction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    /// Position of this partition within the call.
    pub index: usize,
    pub start: usize,
    pub end: usize,
    /// True only for the final partition of a partitioned call.
    ///
    /// Unpartitioned calls always see `false`, so a backend never switches
    /// to a remainder graph for them.
    pub is_last: bool,
}

impl Partition {
    /// The single range covering all `rows` of an unpartitioned call.
    pub fn whole(rows: usize) -> Self {
        Self { index: 0, start: 0, end: rows, is_last: false }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `total` rows into `max(1, ceil(total / batch_size))` contiguous partitions.
pub fn partitions(total: usize, batch_size: usize) -> Vec<Partition> {
    let batch_size = batch_size.max(1);
    let count = total.div_ceil(batch_size).max(1);
    (0..count)
        .map(|index| {
            let start = (index * batch_size).min(total);
            let end = (start + batch_size).min(total);
            Partition { index, start, end, is_last: index == count - 1 }
        })
        .collect()
}

/// Runs a scoring function either once or once per partition.
///
/// Partitions are awaited strictly one after the other; the [`Partition`]
/// handed to the scoring function is the only per-call state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchExecutor {
    batch_size: Option<usize>,
}

impl BatchExecutor {
    pub fn new(batch_size: Option<usize>) -> Self {
        Self { batch_size }
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    /// Score `inputs`, which must already share one row count.
    ///
    /// With `reshape` the result is shaped `(rows, -1)`, otherwise the
    /// partitioned path returns the flat concatenation of partition outputs.
    pub async fn run<'a, F>(&self, score: F, inputs: Vec<HostArray>, reshape: bool) -> Result<HostArray>
    where
        F: Fn(Vec<HostArray>, Partition) -> BoxFuture<'a, Result<HostArray>>,
    {
        let total = inputs
            .first()
            .and_then(HostArray::rows)
            .ok_or_else(|| Error::shape("batched inputs", "at least one array with a row dimension", "none"))?;

        match self.batch_size {
            Some(batch_size) if batch_size != total => {
                self.run_partitioned(score, inputs, total, batch_size, reshape).await
            }
            _ => {
                let output = score(inputs, Partition::whole(total)).await?;
                if reshape { output.reshape_rows(total) } else { Ok(output) }
            }
        }
    }

    async fn run_partitioned<'a, F>(
        &self,
        score: F,
        inputs: Vec<HostArray>,
        total: usize,
        batch_size: usize,
        reshape: bool,
    ) -> Result<HostArray>
    where
        F: Fn(Vec<HostArray>, Partition) -> BoxFuture<'a, Result<HostArray>>,
    {
        let parts = partitions(total, batch_size);
        let mut outputs = Vec::with_capacity(parts.len());
        let mut row_width = None;

        for partition in parts {
            debug!(
                partition = partition.index,
                start = partition.start,
                end = partition.end,
                is_last = partition.is_last,
                "scoring partition"
            );
            let batch = inputs
                .iter()
                .map(|input| input.slice_rows(partition.start, partition.end))
                .collect();
            let output = score(batch, partition).await?;
            check_row_width(&output, &partition, &mut row_width)?;
            outputs.push(output);
        }

        let joined = HostArray::concat_flat(outputs)?;
        if reshape { joined.reshape_rows(total) } else { Ok(joined) }
    }
}

/// Every partition must produce the same number of values per row.
fn check_row_width(output: &HostArray, partition: &Partition, row_width: &mut Option<usize>) -> Result<()> {
    let rows = partition.len();
    if rows == 0 {
        return Ok(());
    }
    if output.len() % rows != 0 {
        return Err(Error::shape(
            format!("partition {} output", partition.index),
            format!("a multiple of {rows} values"),
            output.len(),
        ));
    }
    let width = output.len() / rows;
    match *row_width {
        None => *row_width = Some(width),
        Some(expected) if expected != width => {
            return Err(Error::shape(
                format!("partition {} values per row", partition.index),
                expected,
                width,
            ));
        }
        Some(_) => {}
    }
    Ok(())
}
