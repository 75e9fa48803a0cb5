//! Sharing management: mutations
//!
//! `share_node` is diff-and-apply: for every target email the first of
//! {existing invitation, existing external invitation, existing member}
//! wins and is updated in place when the role differs; only genuinely new
//! collaborators get a fresh invitation of the appropriate kind. Validation
//! (past expiration dates) happens before any network I/O.

use crate::link::{
    generate_password, public_link_url, split_password, with_password_fragment,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;
use velum_api::{ApiService, CreatePublicLinkPayload, ReceivedInvitation, UpdatePublicLinkPayload};
use velum_cache::SharingCache;
use velum_core::effects::directory::{AddressKey, KeyDirectory};
use velum_core::effects::pgp::PgpProvider;
use velum_core::effects::shares::ShareService;
use velum_core::sharing::{
    DecryptedExternalInvitation, DecryptedInvitation, DecryptedMember, DecryptedPublicLink,
    EncryptedInvitation, EncryptedPublicLink, PublicLinkPasswordType, SharedByMeEntry,
    SharingInfo,
};
use velum_core::{
    AbortSignal, ArmoredSignature, ClientConfig, DecryptedNode, Error, InvitationUid,
    MemberRole, NodeUid, Result, ShareId,
};
use velum_nodes::{NodesAccess, NodesEvents, SubscriptionScope};

/// One email to share with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareUser {
    /// Target email.
    pub email: String,
    /// Role to grant.
    pub role: MemberRole,
}

/// Public-link half of [`ShareNodeSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicLinkSettings {
    /// Role granted through the link.
    pub role: MemberRole,
    /// Custom password part appended to the generated one.
    pub custom_password: Option<String>,
    /// Expiration instant; must lie in the future.
    pub expiration_time: Option<chrono::DateTime<Utc>>,
}

/// What [`SharingManagement::share_node`] should converge the share to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareNodeSettings {
    /// Emails to invite or update.
    pub users: Vec<ShareUser>,
    /// Public link to create or update.
    pub public_link: Option<PublicLinkSettings>,
}

/// What [`SharingManagement::unshare_node`] should remove. With no
/// settings the whole share is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnshareNodeSettings {
    /// Emails whose access is revoked (invitations, external invitations
    /// or memberships).
    pub users: Vec<String>,
    /// Whether the public link is removed.
    pub remove_public_link: bool,
}

/// Sharing mutations.
pub struct SharingManagement {
    api: ApiService,
    nodes: Arc<NodesAccess>,
    shares: Arc<dyn ShareService>,
    pgp: Arc<dyn PgpProvider>,
    directory: Arc<dyn KeyDirectory>,
    cache: Arc<SharingCache>,
    events: Arc<NodesEvents>,
    config: ClientConfig,
}

impl SharingManagement {
    /// Build the mutation paths over their collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: ApiService,
        nodes: Arc<NodesAccess>,
        shares: Arc<dyn ShareService>,
        pgp: Arc<dyn PgpProvider>,
        directory: Arc<dyn KeyDirectory>,
        cache: Arc<SharingCache>,
        events: Arc<NodesEvents>,
        config: ClientConfig,
    ) -> Self {
        Self {
            api,
            nodes,
            shares,
            pgp,
            directory,
            cache,
            events,
            config,
        }
    }

    async fn own_address(&self) -> Result<AddressKey> {
        self.directory
            .own_address()
            .await
            .map_err(|error| Error::internal(format!("own address unavailable: {error}")))
    }

    /// Everything shared on a node; empty when the node has no share.
    pub async fn get_sharing_info(
        &self,
        uid: &NodeUid,
        abort: &AbortSignal,
    ) -> Result<SharingInfo> {
        let node = self.nodes.get_node(uid, abort).await?;
        let Some(share_id) = node.share_id.clone() else {
            return Ok(SharingInfo::default());
        };
        let (invitations, external_invitations, members, links) = futures::try_join!(
            self.api.list_invitations(&share_id, abort),
            self.api.list_external_invitations(&share_id, abort),
            self.api.list_members(&share_id, abort),
            self.api.list_public_links(&share_id, abort),
        )?;
        let public_link = self
            .decrypt_first_public_link(&share_id, &node, links)
            .await;
        Ok(SharingInfo {
            invitations: invitations.into_iter().map(decrypt_invitation).collect(),
            external_invitations: external_invitations
                .into_iter()
                .map(decrypt_external_invitation)
                .collect(),
            members: members.into_iter().map(decrypt_member).collect(),
            public_link,
        })
    }

    /// The first public link of a share, decrypted; more than one gets a
    /// warning and the rest is ignored.
    async fn decrypt_first_public_link(
        &self,
        share_id: &ShareId,
        node: &DecryptedNode,
        links: Vec<EncryptedPublicLink>,
    ) -> Option<DecryptedPublicLink> {
        if links.len() > 1 {
            warn!(share = %share_id, count = links.len(), "share has multiple public links, using the first");
        }
        let link = links.into_iter().next()?;
        Some(self.decrypt_public_link(share_id, node, link).await)
    }

    async fn decrypt_public_link(
        &self,
        share_id: &ShareId,
        node: &DecryptedNode,
        link: EncryptedPublicLink,
    ) -> DecryptedPublicLink {
        let base_url = public_link_url(&self.config, share_id, node)
            .unwrap_or_else(|_| format!("https://{}/{}", self.config.public_link_host, link.token));
        let password = match (&link.encrypted_url_password, self.own_address().await) {
            (Some(message), Ok(address)) => match self
                .pgp
                .decrypt(message, std::slice::from_ref(&address.key), &[], None)
                .await
            {
                Ok(decrypted) => String::from_utf8(decrypted.data).ok(),
                Err(error) => {
                    warn!(link = %link.uid, %error, "public link password could not be decrypted");
                    None
                }
            },
            _ => None,
        };
        let url = match &password {
            Some(password) => with_password_fragment(&base_url, password),
            None => base_url,
        };
        let custom_password = password.as_deref().and_then(|p| {
            (link.password_type == PublicLinkPasswordType::GeneratedAndCustom)
                .then(|| split_password(p).and_then(|(_, custom)| custom.map(str::to_owned)))
                .flatten()
        });
        DecryptedPublicLink {
            uid: link.uid,
            url,
            added_by_email: Ok(Some(link.creator_email)),
            role: link.role,
            creation_time: link.creation_time,
            expiration_time: link.expiration_time,
            password_type: link.password_type,
            custom_password,
        }
    }

    /// Share a node: create the share when missing, converge invitations,
    /// members and the public link to `settings`.
    pub async fn share_node(
        &self,
        uid: &NodeUid,
        settings: ShareNodeSettings,
        abort: &AbortSignal,
    ) -> Result<SharingInfo> {
        if let Some(link) = &settings.public_link {
            if let Some(expiration) = link.expiration_time {
                if expiration <= Utc::now() {
                    return Err(Error::validation("expiration date lies in the past"));
                }
            }
        }

        let node = self.nodes.get_node(uid, abort).await?;
        let share_id = match node.share_id.clone() {
            Some(share_id) => share_id,
            None => {
                let share_id = self.shares.create_share(uid).await?;
                let mut updated = node.clone();
                updated.share_id = Some(share_id.clone());
                updated.is_shared = true;
                self.nodes.cache().set_node(&updated).await;
                share_id
            }
        };

        let (invitations, external_invitations, members, links) = futures::try_join!(
            self.api.list_invitations(&share_id, abort),
            self.api.list_external_invitations(&share_id, abort),
            self.api.list_members(&share_id, abort),
            self.api.list_public_links(&share_id, abort),
        )?;
        let address = self.own_address().await?;

        for user in &settings.users {
            abort.check("share node")?;
            if let Some(existing) = invitations
                .iter()
                .find(|i| i.invitee_email == user.email)
            {
                if existing.role != user.role {
                    self.api
                        .update_invitation_role(&existing.uid, user.role, abort)
                        .await?;
                }
            } else if let Some(existing) = external_invitations
                .iter()
                .find(|i| i.invitee_email == user.email)
            {
                if existing.role != user.role {
                    self.api
                        .update_external_invitation_role(&existing.uid, user.role, abort)
                        .await?;
                }
            } else if let Some(existing) =
                members.iter().find(|m| m.email == user.email)
            {
                if existing.role != user.role {
                    self.api
                        .update_member_role(&existing.uid, user.role, abort)
                        .await?;
                }
            } else {
                self.invite(&share_id, &address, user, abort).await?;
            }
        }

        if let Some(link_settings) = &settings.public_link {
            self.converge_public_link(&share_id, &address, links, link_settings, abort)
                .await?;
        }

        self.cache
            .add_shared_by_me(SharedByMeEntry {
                node_uid: uid.clone(),
                share_id: share_id.clone(),
            })
            .ok();
        self.events
            .notify_sharing_changed(SubscriptionScope::SharedByMe);

        self.get_sharing_info(uid, abort).await
    }

    /// Create a fresh invitation of the appropriate kind for one email.
    async fn invite(
        &self,
        share_id: &ShareId,
        address: &AddressKey,
        user: &ShareUser,
        abort: &AbortSignal,
    ) -> Result<()> {
        let internal = self
            .directory
            .is_internal_address(&user.email)
            .await
            .map_err(|error| Error::internal(error.to_string()))?;
        if internal {
            let session_key = self.shares.share_session_key(share_id).await?;
            let invitee_keys = self
                .directory
                .public_keys(&user.email)
                .await
                .map_err(|error| Error::internal(error.to_string()))?;
            let invitee_key = invitee_keys.into_iter().next().ok_or_else(|| {
                Error::validation(format!("no public key for {}", user.email))
            })?;
            let packet = self
                .pgp
                .encrypt_session_key(&session_key, &invitee_key)
                .await
                .map_err(|error| Error::decryption(format!("invitation key packet: {error}")))?;
            let signature = self
                .pgp
                .sign_detached(&packet, &address.key)
                .await
                .map_err(|error| Error::decryption(format!("invitation signature: {error}")))?;
            self.api
                .create_invitation(
                    share_id,
                    user.email.clone(),
                    user.role,
                    BASE64.encode(&packet),
                    Some(signature),
                    abort,
                )
                .await?;
        } else {
            let signature = self
                .pgp
                .sign_detached(user.email.as_bytes(), &address.key)
                .await
                .map_err(|error| Error::decryption(format!("invitation signature: {error}")))?;
            self.api
                .create_external_invitation(
                    share_id,
                    user.email.clone(),
                    user.role,
                    Some(signature),
                    abort,
                )
                .await?;
        }
        Ok(())
    }

    /// Create or update the share's public link.
    async fn converge_public_link(
        &self,
        share_id: &ShareId,
        address: &AddressKey,
        links: Vec<EncryptedPublicLink>,
        settings: &PublicLinkSettings,
        abort: &AbortSignal,
    ) -> Result<()> {
        if links.len() > 1 {
            warn!(share = %share_id, "share has multiple public links, updating the first");
        }
        match links.into_iter().next() {
            None => {
                let generated = generate_password();
                let full = format!(
                    "{generated}{}",
                    settings.custom_password.as_deref().unwrap_or("")
                );
                let encrypted = self
                    .pgp
                    .encrypt(
                        full.as_bytes(),
                        None,
                        std::slice::from_ref(&address.key),
                        Some(&address.key),
                    )
                    .await
                    .map_err(|error| {
                        Error::decryption(format!("link password encryption: {error}"))
                    })?;
                self.api
                    .create_public_link(
                        share_id,
                        CreatePublicLinkPayload {
                            role: settings.role,
                            expiration_time: settings.expiration_time,
                            custom_password: settings.custom_password.is_some(),
                            encrypted_url_password: encrypted,
                        },
                        abort,
                    )
                    .await?;
            }
            Some(existing) => {
                if existing.password_type == PublicLinkPasswordType::Legacy {
                    return Err(Error::validation(
                        "legacy public links cannot be updated",
                    ));
                }
                let encrypted_password = existing.encrypted_url_password.as_ref().ok_or_else(
                    || Error::validation("legacy public links cannot be updated"),
                )?;
                let decrypted = self
                    .pgp
                    .decrypt(
                        encrypted_password,
                        std::slice::from_ref(&address.key),
                        &[],
                        None,
                    )
                    .await
                    .map_err(|error| {
                        Error::decryption(format!("link password decryption: {error}"))
                    })?;
                let current = String::from_utf8(decrypted.data)
                    .map_err(|_| Error::decryption("link password is not valid UTF-8"))?;
                let Some((generated, current_custom)) = split_password(&current) else {
                    // Generated part has an unexpected length.
                    return Err(Error::validation(
                        "legacy public links cannot be updated",
                    ));
                };

                let new_custom = settings.custom_password.as_deref();
                let password_changed = current_custom != new_custom;
                let encrypted_url_password = if password_changed {
                    let full = format!("{generated}{}", new_custom.unwrap_or(""));
                    Some(
                        self.pgp
                            .encrypt(
                                full.as_bytes(),
                                None,
                                std::slice::from_ref(&address.key),
                                Some(&address.key),
                            )
                            .await
                            .map_err(|error| {
                                Error::decryption(format!(
                                    "link password encryption: {error}"
                                ))
                            })?,
                    )
                } else {
                    None
                };

                self.api
                    .update_public_link(
                        &existing.uid,
                        UpdatePublicLinkPayload {
                            role: (existing.role != settings.role).then_some(settings.role),
                            expiration_time: (existing.expiration_time
                                != settings.expiration_time)
                                .then_some(settings.expiration_time),
                            encrypted_url_password,
                            custom_password: password_changed
                                .then_some(new_custom.is_some()),
                        },
                        abort,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Remove collaborators from a share, or the whole share with no
    /// settings. Deleting the last collaborator deletes the share.
    pub async fn unshare_node(
        &self,
        uid: &NodeUid,
        settings: Option<UnshareNodeSettings>,
        abort: &AbortSignal,
    ) -> Result<()> {
        let node = self.nodes.get_node(uid, abort).await?;
        let Some(share_id) = node.share_id.clone() else {
            return Ok(());
        };

        let share_deleted = match settings {
            None => {
                self.shares.delete_share(&share_id).await?;
                true
            }
            Some(settings) => {
                let (invitations, external_invitations, members, links) = futures::try_join!(
                    self.api.list_invitations(&share_id, abort),
                    self.api.list_external_invitations(&share_id, abort),
                    self.api.list_members(&share_id, abort),
                    self.api.list_public_links(&share_id, abort),
                )?;

                let mut remaining = invitations.len()
                    + external_invitations.len()
                    + members.len()
                    + links.len();
                let mut handled: std::collections::HashSet<&str> = std::collections::HashSet::new();
                for email in &settings.users {
                    abort.check("unshare node")?;
                    if !handled.insert(email.as_str()) {
                        continue;
                    }
                    if let Some(invitation) =
                        invitations.iter().find(|i| &i.invitee_email == email)
                    {
                        self.api.delete_invitation(&invitation.uid, abort).await?;
                        remaining -= 1;
                    } else if let Some(invitation) = external_invitations
                        .iter()
                        .find(|i| &i.invitee_email == email)
                    {
                        self.api
                            .delete_external_invitation(&invitation.uid, abort)
                            .await?;
                        remaining -= 1;
                    } else if let Some(member) =
                        members.iter().find(|m| &m.email == email)
                    {
                        self.api.remove_member(&member.uid, abort).await?;
                        remaining -= 1;
                    }
                }
                if settings.remove_public_link {
                    for link in &links {
                        self.api.delete_public_link(&link.uid, abort).await?;
                        remaining -= 1;
                    }
                }
                if remaining == 0 {
                    self.shares.delete_share(&share_id).await?;
                    true
                } else {
                    false
                }
            }
        };

        if share_deleted {
            let mut updated = node;
            updated.share_id = None;
            updated.is_shared = false;
            self.nodes.cache().set_node(&updated).await;
            self.cache.remove_shared_by_me(uid).ok();
        }
        self.events
            .notify_sharing_changed(SubscriptionScope::SharedByMe);
        Ok(())
    }

    /// Re-send the email for a pending invitation on the node's share.
    pub async fn resend_invitation_email(
        &self,
        uid: &NodeUid,
        invitation_uid: &InvitationUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        let node = self.nodes.get_node(uid, abort).await?;
        let (invitation_share, _) = invitation_uid.split()?;
        if node.share_id.as_ref() != Some(&invitation_share) {
            return Err(Error::validation(
                "invitation does not belong to this node's share",
            ));
        }
        let invitations = self.api.list_invitations(&invitation_share, abort).await?;
        if !invitations.iter().any(|i| &i.uid == invitation_uid) {
            return Err(Error::not_found(format!("invitation {invitation_uid}")));
        }
        self.api.send_invitation_email(invitation_uid, abort).await
    }

    /// Accept an invitation addressed to the caller: sign the share session
    /// key with the address key and confirm membership.
    pub async fn accept_invitation(
        &self,
        invitation: &ReceivedInvitation,
        abort: &AbortSignal,
    ) -> Result<()> {
        let address = self.own_address().await?;
        let packet = BASE64
            .decode(&invitation.key_packet)
            .map_err(|error| Error::decryption(format!("invitation key packet: {error}")))?;
        let session_key = self
            .pgp
            .decrypt_session_key(&packet, std::slice::from_ref(&address.key))
            .await
            .map_err(|error| Error::decryption(format!("invitation key packet: {error}")))?;
        let signature: ArmoredSignature = self
            .pgp
            .sign_detached(session_key.data(), &address.key)
            .await
            .map_err(|error| Error::decryption(format!("membership signature: {error}")))?;
        self.api
            .accept_invitation(&invitation.uid, signature, abort)
            .await?;
        self.cache.reset();
        self.events
            .notify_sharing_changed(SubscriptionScope::SharedWithMe);
        Ok(())
    }

    /// Decline an invitation addressed to the caller.
    pub async fn reject_invitation(
        &self,
        invitation_uid: &InvitationUid,
        abort: &AbortSignal,
    ) -> Result<()> {
        self.api.reject_invitation(invitation_uid, abort).await?;
        self.events
            .notify_sharing_changed(SubscriptionScope::SharedWithMe);
        Ok(())
    }

    /// Remove a saved bookmark.
    pub async fn remove_bookmark(&self, token: &str, abort: &AbortSignal) -> Result<()> {
        self.api.delete_bookmark(token, abort).await
    }
}

impl std::fmt::Debug for SharingManagement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharingManagement").finish_non_exhaustive()
    }
}

fn decrypt_invitation(invitation: EncryptedInvitation) -> DecryptedInvitation {
    DecryptedInvitation {
        uid: invitation.uid,
        invitee_email: invitation.invitee_email,
        added_by_email: Ok(Some(invitation.inviter_email)),
        role: invitation.role,
        invitation_time: invitation.invitation_time,
    }
}

fn decrypt_external_invitation(
    invitation: velum_core::sharing::EncryptedExternalInvitation,
) -> DecryptedExternalInvitation {
    DecryptedExternalInvitation {
        uid: invitation.uid,
        invitee_email: invitation.invitee_email,
        added_by_email: Ok(Some(invitation.inviter_email)),
        role: invitation.role,
        invitation_time: invitation.invitation_time,
        state: invitation.state,
    }
}

fn decrypt_member(member: velum_core::sharing::EncryptedMember) -> DecryptedMember {
    DecryptedMember {
        uid: member.uid,
        email: member.email,
        added_by_email: Ok(Some(member.inviter_email)),
        role: member.role,
        invitation_time: member.invitation_time,
    }
}
