use std::future::Future;

use futures_util::future::{select_all, select_ok};
use futures_util::FutureExt;
use tracing::{debug, error};

use crate::error::{AppError, Result};

/// Race fallible tasks and keep the first success.
///
/// The losers are dropped as soon as a winner is found. If every task fails,
/// the error of the last one to fail is returned.
pub async fn first_ok<I, Fut, T>(tasks: I) -> Result<T>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    // Box the futures to satisfy select_ok's Unpin requirement
    let futures: Vec<_> = tasks.into_iter().map(|fut| fut.boxed()).collect();

    // select_ok panics on an empty set
    if futures.is_empty() {
        return Err(AppError::TaskFailed("no tasks to race".into()));
    }

    let contenders = futures.len();
    match select_ok(futures).await {
        Ok((result, remaining)) => {
            debug!("Race won with {} of {} contenders still running", remaining.len(), contenders);
            Ok(result)
        }
        Err(e) => {
            error!("All {} contenders failed. Last error: {}", contenders, e);
            Err(e)
        }
    }
}

/// Wait for whichever task finishes first, successful or not, and report
/// its position in the input along with its output.
pub async fn first<I, Fut, T>(tasks: I) -> Result<(usize, T)>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let futures: Vec<_> = tasks.into_iter().map(|fut| fut.boxed()).collect();

    if futures.is_empty() {
        return Err(AppError::TaskFailed("no tasks to race".into()));
    }

    let (output, index, _remaining) = select_all(futures).await;
    Ok((index, output))
}
