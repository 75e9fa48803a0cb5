//! Sharing endpoints: listings, invitations, members, public links,
//! bookmarks

use super::ApiService;
use crate::proto::{
    check_code, role_name, AcceptInvitationRequest, AckResponse, BookmarkDto, BookmarksResponse,
    CreateExternalInvitationRequest, CreateInvitationRequest, CreatePublicLinkRequest,
    ExternalInvitationDto, ExternalInvitationResponse, ExternalInvitationsResponse, InvitationDto,
    InvitationResponse, InvitationsResponse, MemberDto, MembersResponse, PublicLinkDto,
    PublicLinkResponse, PublicLinksResponse, ReceivedInvitationsPage, SharedByMePage,
    SharedWithMePage, UpdatePublicLinkRequest, UpdateRoleRequest,
};
use crate::transport::ApiRequest;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use velum_core::sharing::{
    EncryptedBookmark, EncryptedExternalInvitation, EncryptedInvitation, EncryptedMember,
    EncryptedPublicLink, SharedByMeEntry,
};
use velum_core::{
    AbortSignal, ArmoredMessage, ArmoredSignature, Error, InvitationUid, MemberRole, MemberUid,
    NodeUid, PublicLinkUid, Result, ShareId,
};

/// An invitation addressed to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedInvitation {
    /// Composite invitation UID.
    pub uid: InvitationUid,
    /// UID of the shared node.
    pub node_uid: NodeUid,
    /// Who invited.
    pub inviter_email: String,
    /// Which of the caller's addresses was invited.
    pub invitee_email: String,
    /// Offered role.
    pub role: MemberRole,
    /// When the invitation was created.
    pub invitation_time: DateTime<Utc>,
    /// Base64 share session key packet, decryptable with the caller's
    /// address key; signed over on acceptance.
    pub key_packet: String,
}

/// Fields of a public link creation, produced by the sharing service.
#[derive(Debug, Clone)]
pub struct CreatePublicLinkPayload {
    /// Granted role.
    pub role: MemberRole,
    /// Expiration instant, if any.
    pub expiration_time: Option<DateTime<Utc>>,
    /// Whether a custom password part is included.
    pub custom_password: bool,
    /// Link password encrypted to the creator.
    pub encrypted_url_password: ArmoredMessage,
}

/// Fields of a public link update, produced by the sharing service.
#[derive(Debug, Clone, Default)]
pub struct UpdatePublicLinkPayload {
    /// New role.
    pub role: Option<MemberRole>,
    /// New expiration; `Some(None)` clears it.
    pub expiration_time: Option<Option<DateTime<Utc>>>,
    /// Re-encrypted link password.
    pub encrypted_url_password: Option<ArmoredMessage>,
    /// Whether the new password includes a custom part.
    pub custom_password: Option<bool>,
}

impl ApiService {
    /// List pending invitations on a share.
    pub async fn list_invitations(
        &self,
        share_id: &ShareId,
        abort: &AbortSignal,
    ) -> Result<Vec<EncryptedInvitation>> {
        let request = ApiRequest::get(format!("drive/v1/shares/{share_id}/invitations"));
        let response: InvitationsResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response
            .invitations
            .into_iter()
            .map(InvitationDto::into_encrypted_invitation)
            .collect()
    }

    /// List pending external invitations on a share.
    pub async fn list_external_invitations(
        &self,
        share_id: &ShareId,
        abort: &AbortSignal,
    ) -> Result<Vec<EncryptedExternalInvitation>> {
        let request =
            ApiRequest::get(format!("drive/v1/shares/{share_id}/external-invitations"));
        let response: ExternalInvitationsResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response
            .external_invitations
            .into_iter()
            .map(ExternalInvitationDto::into_encrypted_external_invitation)
            .collect()
    }

    /// List members of a share.
    pub async fn list_members(
        &self,
        share_id: &ShareId,
        abort: &AbortSignal,
    ) -> Result<Vec<EncryptedMember>> {
        let request = ApiRequest::get(format!("drive/v1/shares/{share_id}/members"));
        let response: MembersResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response
            .members
            .into_iter()
            .map(MemberDto::into_encrypted_member)
            .collect()
    }

    /// List public links of a share, in backend order.
    pub async fn list_public_links(
        &self,
        share_id: &ShareId,
        abort: &AbortSignal,
    ) -> Result<Vec<EncryptedPublicLink>> {
        let request = ApiRequest::get(format!("drive/v1/shares/{share_id}/urls"));
        let response: PublicLinksResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response
            .public_links
            .into_iter()
            .map(PublicLinkDto::into_encrypted_public_link)
            .collect()
    }

    /// Invite a service user to a share.
    pub async fn create_invitation(
        &self,
        share_id: &ShareId,
        invitee_email: String,
        role: MemberRole,
        key_packet: String,
        key_packet_signature: Option<ArmoredSignature>,
        abort: &AbortSignal,
    ) -> Result<EncryptedInvitation> {
        let body = CreateInvitationRequest {
            invitee_email,
            role: role_name(role).to_owned(),
            key_packet,
            key_packet_signature: key_packet_signature.map(|s| s.0),
        };
        let request = ApiRequest::post(
            format!("drive/v1/shares/{share_id}/invitations"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode invitation: {error}")))?,
        );
        let response: InvitationResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response.invitation.into_encrypted_invitation()
    }

    /// Change the role offered by a pending invitation.
    pub async fn update_invitation_role(
        &self,
        invitation_uid: &InvitationUid,
        role: MemberRole,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, invitation_id) = invitation_uid.split()?;
        let body = UpdateRoleRequest {
            role: role_name(role).to_owned(),
        };
        let request = ApiRequest::put(
            format!("drive/v1/shares/{share_id}/invitations/{invitation_id}"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode role update: {error}")))?,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Withdraw a pending invitation.
    pub async fn delete_invitation(
        &self,
        invitation_uid: &InvitationUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, invitation_id) = invitation_uid.split()?;
        let request = ApiRequest::delete(format!(
            "drive/v1/shares/{share_id}/invitations/{invitation_id}"
        ));
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Re-send the invitation email.
    pub async fn send_invitation_email(
        &self,
        invitation_uid: &InvitationUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, invitation_id) = invitation_uid.split()?;
        let request = ApiRequest::post(
            format!("drive/v1/shares/{share_id}/invitations/{invitation_id}/sendemail"),
            serde_json::Value::Null,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Accept an invitation addressed to the caller.
    pub async fn accept_invitation(
        &self,
        invitation_uid: &InvitationUid,
        session_key_signature: ArmoredSignature,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, invitation_id) = invitation_uid.split()?;
        let body = AcceptInvitationRequest {
            session_key_signature: session_key_signature.0,
        };
        let request = ApiRequest::post(
            format!("drive/v1/shares/{share_id}/invitations/{invitation_id}/accept"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode accept: {error}")))?,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Reject an invitation addressed to the caller.
    pub async fn reject_invitation(
        &self,
        invitation_uid: &InvitationUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, invitation_id) = invitation_uid.split()?;
        let request = ApiRequest::post(
            format!("drive/v1/shares/{share_id}/invitations/{invitation_id}/reject"),
            serde_json::Value::Null,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Invite a non-service email to a share.
    pub async fn create_external_invitation(
        &self,
        share_id: &ShareId,
        invitee_email: String,
        role: MemberRole,
        signature: Option<ArmoredSignature>,
        abort: &AbortSignal,
    ) -> Result<EncryptedExternalInvitation> {
        let body = CreateExternalInvitationRequest {
            invitee_email,
            role: role_name(role).to_owned(),
            signature: signature.map(|s| s.0),
        };
        let request = ApiRequest::post(
            format!("drive/v1/shares/{share_id}/external-invitations"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode external invitation: {error}")))?,
        );
        let response: ExternalInvitationResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response
            .external_invitation
            .into_encrypted_external_invitation()
    }

    /// Change the role offered by a pending external invitation.
    pub async fn update_external_invitation_role(
        &self,
        invitation_uid: &InvitationUid,
        role: MemberRole,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, invitation_id) = invitation_uid.split()?;
        let body = UpdateRoleRequest {
            role: role_name(role).to_owned(),
        };
        let request = ApiRequest::put(
            format!("drive/v1/shares/{share_id}/external-invitations/{invitation_id}"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode role update: {error}")))?,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Withdraw a pending external invitation.
    pub async fn delete_external_invitation(
        &self,
        invitation_uid: &InvitationUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, invitation_id) = invitation_uid.split()?;
        let request = ApiRequest::delete(format!(
            "drive/v1/shares/{share_id}/external-invitations/{invitation_id}"
        ));
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Change a member's role.
    pub async fn update_member_role(
        &self,
        member_uid: &MemberUid,
        role: MemberRole,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, member_id) = member_uid.split()?;
        let body = UpdateRoleRequest {
            role: role_name(role).to_owned(),
        };
        let request = ApiRequest::put(
            format!("drive/v1/shares/{share_id}/members/{member_id}"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode role update: {error}")))?,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Remove a member from a share.
    pub async fn remove_member(
        &self,
        member_uid: &MemberUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, member_id) = member_uid.split()?;
        let request =
            ApiRequest::delete(format!("drive/v1/shares/{share_id}/members/{member_id}"));
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Create a public link on a share.
    pub async fn create_public_link(
        &self,
        share_id: &ShareId,
        payload: CreatePublicLinkPayload,
        abort: &AbortSignal,
    ) -> Result<EncryptedPublicLink> {
        let body = CreatePublicLinkRequest {
            role: role_name(payload.role).to_owned(),
            expiration_time: payload.expiration_time.map(|t| t.timestamp()),
            password_type: if payload.custom_password {
                "GeneratedAndCustom".to_owned()
            } else {
                "Generated".to_owned()
            },
            encrypted_url_password: payload.encrypted_url_password.0,
        };
        let request = ApiRequest::post(
            format!("drive/v1/shares/{share_id}/urls"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode public link: {error}")))?,
        );
        let response: PublicLinkResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response.public_link.into_encrypted_public_link()
    }

    /// Update a public link.
    pub async fn update_public_link(
        &self,
        public_link_uid: &PublicLinkUid,
        payload: UpdatePublicLinkPayload,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, link_id) = public_link_uid.split()?;
        let body = UpdatePublicLinkRequest {
            role: payload.role.map(|r| role_name(r).to_owned()),
            expiration_time: payload
                .expiration_time
                .map(|t| t.map(|t| t.timestamp())),
            encrypted_url_password: payload.encrypted_url_password.map(|m| m.0),
            password_type: payload.custom_password.map(|custom| {
                if custom {
                    "GeneratedAndCustom".to_owned()
                } else {
                    "Generated".to_owned()
                }
            }),
        };
        let request = ApiRequest::put(
            format!("drive/v1/shares/{share_id}/urls/{link_id}"),
            serde_json::to_value(body)
                .map_err(|error| Error::internal(format!("encode public link update: {error}")))?,
        );
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Delete a public link.
    pub async fn delete_public_link(
        &self,
        public_link_uid: &PublicLinkUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        let (share_id, link_id) = public_link_uid.split()?;
        let request =
            ApiRequest::delete(format!("drive/v1/shares/{share_id}/urls/{link_id}"));
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// List the caller's saved bookmarks.
    pub async fn list_bookmarks(&self, abort: &AbortSignal) -> Result<Vec<EncryptedBookmark>> {
        let request = ApiRequest::get("drive/v1/sharedwithme/bookmarks");
        let response: BookmarksResponse = self.call(request, abort).await?;
        check_code(response.code, None)?;
        response
            .bookmarks
            .into_iter()
            .map(BookmarkDto::into_encrypted_bookmark)
            .collect()
    }

    /// Remove a saved bookmark.
    pub async fn delete_bookmark(&self, token: &str, abort: &AbortSignal) -> Result<()> {
        let request =
            ApiRequest::delete(format!("drive/v1/sharedwithme/bookmarks/{token}"));
        let response: AckResponse = self.call(request, abort).await?;
        check_code(response.code, response.error.as_deref())
    }

    /// Iterate nodes the caller has shared, anchor-paginated.
    pub fn iterate_shared_by_me(&self, abort: AbortSignal) -> SharedByMeIter {
        SharedByMeIter {
            service: self.clone(),
            anchor: None,
            done: false,
            buffer: VecDeque::new(),
            abort,
        }
    }

    /// Iterate node UIDs shared with the caller, anchor-paginated.
    pub fn iterate_shared_with_me(&self, abort: AbortSignal) -> SharedWithMeIter {
        SharedWithMeIter {
            service: self.clone(),
            anchor: None,
            done: false,
            buffer: VecDeque::new(),
            abort,
        }
    }

    /// Iterate invitations addressed to the caller, anchor-paginated.
    pub fn iterate_received_invitations(&self, abort: AbortSignal) -> ReceivedInvitationIter {
        ReceivedInvitationIter {
            service: self.clone(),
            anchor: None,
            done: false,
            buffer: VecDeque::new(),
            abort,
        }
    }
}

macro_rules! anchor_page_next {
    ($self:ident, $path:expr, $page_ty:ty, $items:ident, $map:expr) => {{
        loop {
            if let Some(item) = $self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if $self.done {
                return None;
            }
            if let Err(error) = $self.abort.check("sharing listing") {
                $self.done = true;
                return Some(Err(error));
            }
            let mut path = String::from($path);
            if let Some(anchor) = &$self.anchor {
                path.push_str("?Anchor=");
                path.push_str(anchor);
            }
            let page: Result<$page_ty> =
                $self.service.call(ApiRequest::get(path), &$self.abort).await;
            match page.and_then(|p| check_code(p.code, None).map(|()| p)) {
                Ok(page) => {
                    $self.anchor = page.next_anchor;
                    $self.done = $self.anchor.is_none();
                    for item in page.$items {
                        match $map(item) {
                            Ok(mapped) => $self.buffer.push_back(mapped),
                            Err(error) => {
                                $self.done = true;
                                return Some(Err(error));
                            }
                        }
                    }
                }
                Err(error) => {
                    $self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }};
}

/// Anchor-paginated iterator over the shared-by-me listing.
pub struct SharedByMeIter {
    service: ApiService,
    anchor: Option<String>,
    done: bool,
    buffer: VecDeque<SharedByMeEntry>,
    abort: AbortSignal,
}

impl SharedByMeIter {
    /// Next entry, or `None` at the natural end.
    pub async fn next(&mut self) -> Option<Result<SharedByMeEntry>> {
        anchor_page_next!(
            self,
            "drive/v1/sharedbyme",
            SharedByMePage,
            items,
            |dto: crate::proto::SharedByMeDto| Ok::<_, Error>(dto.into_entry())
        )
    }
}

/// Anchor-paginated iterator over the shared-with-me listing.
pub struct SharedWithMeIter {
    service: ApiService,
    anchor: Option<String>,
    done: bool,
    buffer: VecDeque<NodeUid>,
    abort: AbortSignal,
}

impl SharedWithMeIter {
    /// Next node UID, or `None` at the natural end.
    pub async fn next(&mut self) -> Option<Result<NodeUid>> {
        anchor_page_next!(
            self,
            "drive/v1/sharedwithme",
            SharedWithMePage,
            node_uids,
            |uid: String| Ok::<_, Error>(NodeUid::from_raw(uid))
        )
    }
}

/// Anchor-paginated iterator over invitations addressed to the caller.
pub struct ReceivedInvitationIter {
    service: ApiService,
    anchor: Option<String>,
    done: bool,
    buffer: VecDeque<ReceivedInvitation>,
    abort: AbortSignal,
}

impl ReceivedInvitationIter {
    /// Next invitation, or `None` at the natural end.
    pub async fn next(&mut self) -> Option<Result<ReceivedInvitation>> {
        anchor_page_next!(
            self,
            "drive/v1/invitations",
            ReceivedInvitationsPage,
            invitations,
            |dto: crate::proto::ReceivedInvitationDto| {
                Ok::<_, Error>(ReceivedInvitation {
                    uid: InvitationUid::from_raw(dto.uid),
                    node_uid: NodeUid::from_raw(dto.node_uid),
                    inviter_email: dto.inviter_email,
                    invitee_email: dto.invitee_email,
                    key_packet: dto.key_packet,
                    role: crate::proto::parse_role(&dto.role)?,
                    invitation_time: DateTime::from_timestamp(dto.invitation_time, 0)
                        .ok_or_else(|| {
                            Error::internal(format!(
                                "backend returned timestamp {} out of range",
                                dto.invitation_time
                            ))
                        })?,
                })
            }
        )
    }
}
