//! Revision endpoints

use super::ApiService;
use crate::proto::{check_code, AckResponse, RevisionDto, RevisionsResponse};
use crate::transport::ApiRequest;
use velum_core::{AbortSignal, EncryptedRevision, NodeUid, Result, RevisionUid};

impl ApiService {
    /// List the revisions of a file, newest first.
    pub async fn get_revisions(
        &self,
        uid: &NodeUid,
        abort: &AbortSignal,
    ) -> Result<Vec<EncryptedRevision>> {
        let (volume, node_id) = uid.split()?;
        let request = ApiRequest::get(format!(
            "drive/v1/volumes/{volume}/files/{node_id}/revisions"
        ));
        let response: RevisionsResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response
            .revisions
            .into_iter()
            .map(RevisionDto::into_encrypted_revision)
            .collect()
    }

    /// Restore a superseded revision as the active one.
    pub async fn restore_revision(
        &self,
        revision_uid: &RevisionUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (volume, node_id, revision_id) = revision_uid.split()?;
        let request = ApiRequest::put(
            format!(
                "drive/v1/volumes/{volume}/files/{node_id}/revisions/{revision_id}/restore"
            ),
            serde_json::Value::Null,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Permanently delete a superseded revision.
    pub async fn delete_revision(
        &self,
        revision_uid: &RevisionUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (volume, node_id, revision_id) = revision_uid.split()?;
        let request = ApiRequest::delete(format!(
            "drive/v1/volumes/{volume}/files/{node_id}/revisions/{revision_id}"
        ));
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }
}
