use serenity::{
    http::Http,
    model::{
        guild::{Member, PartialGuild, Role},
        id::{GuildId, UserId},
        sticker::{Sticker, StickerFormatType},
    },
};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info, warn};

use crate::{
    archived_message::{convert_ts, Timestamp},
    util::safe_filename,
};

const CDN: &str = "https://cdn.discordapp.com";
/// Largest page the member list endpoint will serve
const MEMBER_PAGE_SIZE: u64 = 1000;

/// Folders making up one guild's archive
#[derive(Debug, Clone)]
pub struct GuildLayout {
    pub root: PathBuf,
    pub channels: PathBuf,
    pub roles: PathBuf,
    pub emojis: PathBuf,
    pub stickers: PathBuf,
}

impl GuildLayout {
    pub fn new(output_dir: &Path, guild_id: GuildId) -> Self {
        let root = output_dir.join(guild_id.0.to_string());
        Self {
            channels: root.join("channels & messages"),
            roles: root.join("roles"),
            emojis: root.join("emojis"),
            stickers: root.join("stickers"),
            root,
        }
    }

    pub async fn create(&self) -> io::Result<()> {
        for dir in [&self.channels, &self.roles, &self.emojis, &self.stickers] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    Saved,
    /// The server answered with something other than 200
    Missing(u16),
    Failed(String),
}

/// Fetches guild assets over one HTTP session
pub struct AssetDownloader {
    client: reqwest::Client,
}

impl AssetDownloader {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }

    pub async fn download(&self, url: &str, path: &Path, label: &str) -> AssetOutcome {
        let outcome = match self.fetch(url).await {
            Ok(Ok(bytes)) => match tokio::fs::write(path, &bytes).await {
                Ok(()) => AssetOutcome::Saved,
                Err(err) => AssetOutcome::Failed(err.to_string()),
            },
            Ok(Err(status)) => AssetOutcome::Missing(status),
            Err(err) => AssetOutcome::Failed(err.to_string()),
        };

        match &outcome {
            AssetOutcome::Saved => info!(file = %path.display(), "Saved {label}"),
            AssetOutcome::Missing(status) => warn!(status, "{label} not available"),
            AssetOutcome::Failed(err) => error!(%err, "Failed to download {label}"),
        }
        outcome
    }

    async fn fetch(&self, url: &str) -> Result<Result<Vec<u8>, u16>, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Ok(Err(status.as_u16()));
        }
        Ok(Ok(response.bytes().await?.to_vec()))
    }
}

/// The `info.txt` record
#[derive(Debug, Clone)]
pub struct GuildInfo {
    pub id: GuildId,
    pub name: String,
    pub created: Timestamp,
    pub boosts: u64,
    pub boost_tier: String,
    pub member_count: u64,
    pub vanity_url_code: Option<String>,
    pub features: Vec<String>,
}

impl GuildInfo {
    pub fn from_gateway(guild: &PartialGuild, roster_len: usize) -> Self {
        Self {
            id: guild.id,
            name: guild.name.clone(),
            created: convert_ts(guild.id.created_at()),
            boosts: guild.premium_subscription_count,
            boost_tier: format!("{:?}", guild.premium_tier),
            member_count: guild
                .approximate_member_count
                .unwrap_or(roster_len as u64),
            vanity_url_code: guild.vanity_url_code.clone(),
            features: guild.features.clone(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Guild ID: {}\nName: {}\nCreated: {}\nBoosts: {}\nBoost Tier: {}\nMember Count: {}\n",
            self.id.0,
            self.name,
            self.created.format("%Y-%m-%d %H:%M:%S UTC"),
            self.boosts,
            self.boost_tier,
            self.member_count,
        );
        if let Some(code) = &self.vanity_url_code {
            out.push_str(&format!("Vanity URL: https://discord.gg/{code}\n"));
        }
        out.push_str(&format!("Features: {}\n", self.features.join(", ")));
        out
    }
}

pub fn member_line(member: &Member) -> String {
    format_member(&member.user.name, member.user.discriminator, member.user.id)
}

fn format_member(name: &str, discriminator: u16, id: UserId) -> String {
    format!("{name}#{discriminator:04} ({})", id.0)
}

pub fn role_record(role: &Role) -> String {
    format_role(&role.name, role.id.0, role.colour.0, role.permissions.bits())
}

fn format_role(name: &str, id: u64, colour: u32, permissions: u64) -> String {
    format!("Name: {name}\nID: {id}\nColor: #{colour:06x}\nPermissions: {permissions}\n")
}

/// Banner, then splash, then discovery splash, whichever exists first
pub fn invite_banner(guild: &PartialGuild) -> Option<(String, &'static str)> {
    pick_invite_banner(
        guild.id,
        guild.banner.as_deref(),
        guild.splash.as_deref(),
        guild.discovery_splash.as_deref(),
    )
}

fn pick_invite_banner(
    id: GuildId,
    banner: Option<&str>,
    splash: Option<&str>,
    discovery_splash: Option<&str>,
) -> Option<(String, &'static str)> {
    let id = id.0;
    if let Some(hash) = banner {
        return Some((format!("{CDN}/banners/{id}/{hash}.png"), "Guild Banner"));
    }
    if let Some(hash) = splash {
        return Some((format!("{CDN}/splashes/{id}/{hash}.png"), "Guild Splash"));
    }
    discovery_splash.map(|hash| {
        (
            format!("{CDN}/discovery-splashes/{id}/{hash}.png"),
            "Discovery Splash",
        )
    })
}

fn emoji_asset(id: u64, animated: bool) -> (String, &'static str) {
    let ext = if animated { "gif" } else { "png" };
    (format!("{CDN}/emojis/{id}.{ext}"), ext)
}

/// Lottie stickers are json. Every other format, including ones this client
/// does not know, is fetched and saved as png.
fn sticker_asset(id: u64, format: StickerFormatType) -> (String, &'static str) {
    match format {
        StickerFormatType::Lottie => (format!("https://discord.com/stickers/{id}.json"), "json"),
        _ => (format!("https://media.discordapp.net/stickers/{id}.png"), "png"),
    }
}

/// Every member of the guild, paged by user id
async fn fetch_roster(http: &Arc<Http>, guild_id: GuildId) -> serenity::Result<Vec<Member>> {
    let mut roster = Vec::new();
    let mut after: Option<UserId> = None;
    loop {
        let page = guild_id.members(http, Some(MEMBER_PAGE_SIZE), after).await?;
        let done = (page.len() as u64) < MEMBER_PAGE_SIZE;
        after = page.last().map(|member| member.user.id);
        roster.extend(page);
        if done || after.is_none() {
            return Ok(roster);
        }
    }
}

/// Writes `members.txt`. `None` means the roster could not be fetched, in
/// which case no file is written rather than an empty one.
async fn write_member_list(layout: &GuildLayout, lines: Option<Vec<String>>) -> io::Result<()> {
    let Some(lines) = lines else {
        warn!("Member list skipped");
        return Ok(());
    };
    let members: String = lines.iter().map(|line| format!("{line}\n")).collect();
    tokio::fs::write(layout.root.join("members.txt"), members).await?;
    info!(members = lines.len(), "Saved member list");
    Ok(())
}

/// Icon, banner, info, roster, roles, emoji and stickers. Each resource that
/// fails is logged and skipped.
pub async fn snapshot_guild(
    http: &Arc<Http>,
    guild: &PartialGuild,
    layout: &GuildLayout,
    downloader: &AssetDownloader,
) -> io::Result<()> {
    if let Some(hash) = &guild.icon {
        let url = format!("{CDN}/icons/{}/{hash}.png", guild.id.0);
        downloader
            .download(&url, &layout.root.join("icon.png"), "Guild Icon")
            .await;
    }

    match invite_banner(guild) {
        Some((url, label)) => {
            downloader
                .download(&url, &layout.root.join("invitebanner.png"), label)
                .await;
        }
        None => info!("No guild banner or splash available"),
    }

    let roster = match fetch_roster(http, guild.id).await {
        Ok(roster) => Some(roster),
        Err(err) => {
            error!(%err, "Could not fetch the member list");
            None
        }
    };

    let roster_len = roster.as_ref().map_or(0, Vec::len);
    let info = GuildInfo::from_gateway(guild, roster_len);
    tokio::fs::write(layout.root.join("info.txt"), info.render()).await?;

    let lines = roster.map(|roster| roster.iter().map(member_line).collect());
    write_member_list(layout, lines).await?;

    let mut roles: Vec<&Role> = guild.roles.values().collect();
    roles.sort_by_key(|role| (role.position, role.id));
    for role in roles {
        let path = layout.roles.join(format!("{}.txt", safe_filename(&role.name)));
        if let Err(err) = tokio::fs::write(&path, role_record(role)).await {
            error!(role = %role.name, %err, "Could not write role");
        }
    }

    for emoji in guild.emojis.values() {
        let (url, ext) = emoji_asset(emoji.id.0, emoji.animated);
        let path = layout
            .emojis
            .join(format!("{}.{ext}", safe_filename(&emoji.name)));
        downloader
            .download(&url, &path, &format!("Emoji: {}", emoji.name))
            .await;
    }

    let stickers: Vec<Sticker> = match guild.id.stickers(http).await {
        Ok(stickers) => stickers,
        Err(err) => {
            error!(%err, "Could not fetch stickers");
            Vec::new()
        }
    };
    for sticker in stickers {
        let (url, ext) = sticker_asset(sticker.id.0, sticker.format_type);
        let path = layout
            .stickers
            .join(format!("{}.{ext}", safe_filename(&sticker.name)));
        downloader
            .download(&url, &path, &format!("Sticker: {}", sticker.name))
            .await;
    }

    Ok(())
}
