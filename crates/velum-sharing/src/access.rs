//! Sharing access: listings
//!
//! The shared collections are cached as full lists. Iterators prefer the
//! cache when a complete listing was stored; otherwise they drive the API
//! pager, yield decrypted nodes through the nodes batch iterator, and
//! store the completed listing only after the iteration finished.

use std::collections::VecDeque;
use std::sync::Arc;
use velum_api::{ApiService, ReceivedInvitationIter};
use velum_cache::SharingCache;
use velum_core::effects::directory::KeyDirectory;
use velum_core::effects::pgp::PgpProvider;
use velum_core::sharing::{DecryptedBookmark, SharedByMeEntry};
use velum_core::{AbortSignal, NameError, NodeUid, Result};
use velum_nodes::{MaybeNode, NodesAccess};

/// Which shared collection an iterator walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    SharedByMe,
    SharedWithMe,
}

/// Sharing listings.
pub struct SharingAccess {
    api: ApiService,
    nodes: Arc<NodesAccess>,
    cache: Arc<SharingCache>,
    pgp: Arc<dyn PgpProvider>,
    directory: Arc<dyn KeyDirectory>,
}

impl SharingAccess {
    /// Build the listings over their collaborators.
    pub fn new(
        api: ApiService,
        nodes: Arc<NodesAccess>,
        cache: Arc<SharingCache>,
        pgp: Arc<dyn PgpProvider>,
        directory: Arc<dyn KeyDirectory>,
    ) -> Self {
        Self {
            api,
            nodes,
            cache,
            pgp,
            directory,
        }
    }

    /// Iterate the nodes the caller shared.
    pub fn iterate_shared_by_me_nodes<'a>(
        &'a self,
        abort: AbortSignal,
    ) -> SharedNodesIter<'a> {
        SharedNodesIter::new(self, Collection::SharedByMe, abort)
    }

    /// Iterate the nodes shared with the caller.
    pub fn iterate_shared_with_me_nodes<'a>(
        &'a self,
        abort: AbortSignal,
    ) -> SharedNodesIter<'a> {
        SharedNodesIter::new(self, Collection::SharedWithMe, abort)
    }

    /// Iterate invitations addressed to the caller.
    pub fn iterate_received_invitations(&self, abort: AbortSignal) -> ReceivedInvitationIter {
        self.api.iterate_received_invitations(abort)
    }

    /// List the caller's bookmarks. Names are decrypted with the caller's
    /// address key; an unreadable name degrades the entry, never the list.
    pub async fn list_bookmarks(&self, abort: &AbortSignal) -> Result<Vec<DecryptedBookmark>> {
        let encrypted = self.api.list_bookmarks(abort).await?;
        let address = self
            .directory
            .own_address()
            .await
            .map_err(|error| velum_core::Error::internal(error.to_string()))?;
        let mut bookmarks = Vec::with_capacity(encrypted.len());
        for bookmark in encrypted {
            let node_name = match &bookmark.encrypted_node_name {
                None => Err(NameError::Undecryptable {
                    message: "bookmark carries no name".to_owned(),
                }),
                Some(message) => match self
                    .pgp
                    .decrypt(message, std::slice::from_ref(&address.key), &[], None)
                    .await
                {
                    Ok(decrypted) => String::from_utf8(decrypted.data).map_err(|_| {
                        NameError::Undecryptable {
                            message: "bookmark name is not valid UTF-8".to_owned(),
                        }
                    }),
                    Err(error) => Err(NameError::Undecryptable {
                        message: error.to_string(),
                    }),
                },
            };
            bookmarks.push(DecryptedBookmark {
                token: bookmark.token,
                creation_time: bookmark.creation_time,
                node_name,
            });
        }
        Ok(bookmarks)
    }
}

impl std::fmt::Debug for SharingAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharingAccess").finish_non_exhaustive()
    }
}

enum SharedState {
    Init,
    /// Walking a previously completed listing.
    FromCache { uids: VecDeque<NodeUid> },
    /// Everything was flushed; finish once the buffer drains.
    Drained,
    /// Driving the API pager; collected entries populate the cache at the
    /// end.
    Paging {
        by_me: Option<velum_api::SharedByMeIter>,
        with_me: Option<velum_api::SharedWithMeIter>,
        collected_by_me: Vec<SharedByMeEntry>,
        collected_with_me: Vec<NodeUid>,
    },
    /// The listing ended; store it once everything was yielded.
    Complete {
        collected_by_me: Vec<SharedByMeEntry>,
        collected_with_me: Vec<NodeUid>,
    },
}

/// Iterator over one shared collection, yielding decrypted nodes.
pub struct SharedNodesIter<'a> {
    access: &'a SharingAccess,
    collection: Collection,
    abort: AbortSignal,
    state: SharedState,
    queue: Vec<NodeUid>,
    buffer: VecDeque<MaybeNode>,
    done: bool,
}

impl<'a> SharedNodesIter<'a> {
    fn new(access: &'a SharingAccess, collection: Collection, abort: AbortSignal) -> Self {
        Self {
            access,
            collection,
            abort,
            state: SharedState::Init,
            queue: Vec::new(),
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Decrypt the queued UIDs through the nodes batch iterator and append
    /// the results to the buffer. Takes the fields directly so it can run
    /// while the state is borrowed.
    async fn flush(
        access: &SharingAccess,
        abort: &AbortSignal,
        queue: &mut Vec<NodeUid>,
        buffer: &mut VecDeque<MaybeNode>,
    ) -> Result<()> {
        let chunk = std::mem::take(queue);
        if chunk.is_empty() {
            return Ok(());
        }
        let mut iter = access.nodes.iterate_nodes(chunk, abort.clone());
        while let Some(item) = iter.next().await {
            buffer.push_back(item?);
        }
        Ok(())
    }

    /// Next shared node, or `None` at the natural end.
    pub async fn next(&mut self) -> Option<Result<MaybeNode>> {
        loop {
            if self.done {
                return None;
            }
            if let Err(error) = self.abort.check("sharing listing") {
                self.done = true;
                return Some(Err(error));
            }
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }

            match &mut self.state {
                SharedState::Init => {
                    let cached = match self.collection {
                        Collection::SharedByMe => self
                            .access
                            .cache
                            .shared_by_me()
                            .map(|entries| entries.into_iter().map(|e| e.node_uid).collect()),
                        Collection::SharedWithMe => self.access.cache.shared_with_me(),
                    };
                    self.state = match cached {
                        Some(uids) => SharedState::FromCache {
                            uids: VecDeque::from(uids),
                        },
                        None => SharedState::Paging {
                            by_me: matches!(self.collection, Collection::SharedByMe).then(|| {
                                self.access.api.iterate_shared_by_me(self.abort.clone())
                            }),
                            with_me: matches!(self.collection, Collection::SharedWithMe).then(
                                || self.access.api.iterate_shared_with_me(self.abort.clone()),
                            ),
                            collected_by_me: Vec::new(),
                            collected_with_me: Vec::new(),
                        },
                    };
                }
                SharedState::FromCache { uids } => match uids.pop_front() {
                    Some(uid) => {
                        self.queue.push(uid);
                        if self.queue.len() >= velum_core::constants::BATCH_LOADING_SIZE {
                            if let Err(error) = Self::flush(self.access, &self.abort, &mut self.queue, &mut self.buffer).await {
                                self.done = true;
                                return Some(Err(error));
                            }
                        }
                    }
                    None => {
                        if let Err(error) = Self::flush(self.access, &self.abort, &mut self.queue, &mut self.buffer).await {
                            self.done = true;
                            return Some(Err(error));
                        }
                        self.state = SharedState::Drained;
                    }
                },
                SharedState::Drained => {
                    self.done = true;
                }
                SharedState::Paging {
                    by_me,
                    with_me,
                    collected_by_me,
                    collected_with_me,
                } => {
                    let next_uid = match (by_me, with_me) {
                        (Some(iter), _) => match iter.next().await {
                            Some(Ok(entry)) => {
                                collected_by_me.push(entry.clone());
                                Some(Ok(entry.node_uid))
                            }
                            Some(Err(error)) => Some(Err(error)),
                            None => None,
                        },
                        (None, Some(iter)) => match iter.next().await {
                            Some(Ok(uid)) => {
                                collected_with_me.push(uid.clone());
                                Some(Ok(uid))
                            }
                            Some(Err(error)) => Some(Err(error)),
                            None => None,
                        },
                        (None, None) => None,
                    };
                    match next_uid {
                        Some(Ok(uid)) => {
                            self.queue.push(uid);
                            if self.queue.len() >= velum_core::constants::BATCH_LOADING_SIZE {
                                if let Err(error) = Self::flush(self.access, &self.abort, &mut self.queue, &mut self.buffer).await {
                                    self.done = true;
                                    return Some(Err(error));
                                }
                            }
                        }
                        Some(Err(error)) => {
                            self.done = true;
                            return Some(Err(error));
                        }
                        None => {
                            if let Err(error) = Self::flush(self.access, &self.abort, &mut self.queue, &mut self.buffer).await {
                                self.done = true;
                                return Some(Err(error));
                            }
                            let finished_by_me = std::mem::take(collected_by_me);
                            let finished_with_me = std::mem::take(collected_with_me);
                            self.state = SharedState::Complete {
                                collected_by_me: finished_by_me,
                                collected_with_me: finished_with_me,
                            };
                        }
                    }
                }
                SharedState::Complete {
                    collected_by_me,
                    collected_with_me,
                } => {
                    // Populate the cache only after the whole listing was
                    // walked and yielded.
                    match self.collection {
                        Collection::SharedByMe => self
                            .access
                            .cache
                            .set_shared_by_me(std::mem::take(collected_by_me)),
                        Collection::SharedWithMe => self
                            .access
                            .cache
                            .set_shared_with_me(std::mem::take(collected_with_me)),
                    }
                    self.done = true;
                }
            }
        }
    }
}

// Re-exported so callers can name the invitation item type without
// depending on the API crate directly.
pub use velum_api::ReceivedInvitation as ReceivedShareInvitation;
