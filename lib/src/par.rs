//! Fans work out over contiguous row bands of a flat, row-major buffer.
//!
//! Each band is handed out as its own `&mut` slice, so a worker can only ever
//! write the rows it owns.

/// Bands smaller than this are not worth a thread
const MIN_ROWS_PER_BAND: usize = 8;

/// Calls `work(first_row, band)` for consecutive bands of `data`, where a row
/// is `row_len` elements. Bands run on up to `max_threads` scoped threads.
pub(crate) fn for_each_band<T, F>(data: &mut [T], row_len: usize, max_threads: usize, work: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    if data.is_empty() || row_len == 0 {
        return;
    }

    let rows = data.len() / row_len;
    let bands = max_threads.min(rows / MIN_ROWS_PER_BAND).max(1);

    if bands == 1 {
        work(0, data);
        return;
    }

    // for WASM we do not have threads and crossbeam panics,
    // so let's just run the work directly
    #[cfg(target_arch = "wasm32")]
    work(0, data);

    #[cfg(not(target_arch = "wasm32"))]
    {
        let band_rows = (rows + bands - 1) / bands;
        let work = &work;

        let res = crossbeam_utils::thread::scope(|scope| {
            for (i, band) in data.chunks_mut(band_rows * row_len).enumerate() {
                scope.spawn(move |_| work(i * band_rows, band));
            }
        });

        if let Err(panic) = res {
            std::panic::resume_unwind(panic);
        }
    }
}
