use tracing::{debug, warn};

use crate::{
    config::SweepConfig,
    twitter::{Credentials, PageRequest, Post, RemoteError, TimelineClient},
};

/// Walk the whole timeline, newest first.
///
/// The timeline endpoint returns posts at or older than the cursor, so every
/// page after the first normally starts with the post the cursor points at;
/// that repeat is dropped. An empty page ends the walk. Any remote error
/// aborts the walk and nothing gathered so far is returned.
pub async fn fetch_all(
    client: &dyn TimelineClient,
    credentials: &Credentials,
    exclude_replies: bool,
    settings: &SweepConfig,
) -> Result<Vec<Post>, RemoteError> {
    let mut posts: Vec<Post> = Vec::new();
    let mut cursor = None;
    let mut pages = 0u32;

    loop {
        if let Some(limit) = settings.page_limit()
            && pages >= limit
        {
            warn!(
                pages,
                fetched = posts.len(),
                "Page limit reached, stopping timeline fetch early"
            );
            break;
        }

        let request = PageRequest {
            cursor: cursor.clone(),
            page_size: settings.page_size,
            exclude_replies,
        };
        let mut batch = client.fetch_page(credentials, &request).await?;
        pages += 1;

        if let Some(cursor) = &request.cursor
            && batch.first().is_some_and(|first| &first.id == cursor)
        {
            batch.remove(0);
        }

        let Some(last) = batch.last() else {
            break;
        };
        cursor = Some(last.id.clone());

        debug!(page = pages, batch = batch.len(), "Fetched page");
        posts.append(&mut batch);
    }

    debug!(pages, total = posts.len(), "Timeline fetch complete");
    Ok(posts)
}
