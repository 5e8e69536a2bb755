//! 命令行参数
//!
//! 未指定的选项保留配置文件中的值；指定的选项覆盖配置并（除非 `--update-settings`
//! 只更新不运行）在运行前写回配置文件。

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::model::config::{Config, MAX_TWEET_COUNT, MIN_TWEET_COUNT, parse_stream_duration};

/// 按用户名、过滤规则和字段自定义 Twitter API 查询
#[derive(Parser, Debug)]
#[command(
    name = "twiquery",
    version,
    disable_version_flag = true,
    after_help = "不带子命令时运行配置中启用的全部服务；只运行其中一个请使用 usertweet 或 streamtweet"
)]
pub struct Cli {
    /// 显示版本号
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    _version: Option<bool>,

    #[command(flatten)]
    pub user: UserArgs,

    #[command(flatten)]
    pub stream: StreamArgs,

    #[command(flatten)]
    pub misc: MiscArgs,

    /// 配置文件路径
    #[arg(long, global = true, value_name = "PATH", default_value = Config::default_config_path())]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 只拉取用户推文，可自定义用户名 [-u]、推文数量 [-c] 和查询字段
    Usertweet(UserTweetArgs),
    /// 只读取过滤流，可自定义规则 [-r]、标签 [-t] 和时长 [-d]
    Streamtweet(StreamTweetArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct UserArgs {
    /// 查询这些用户的推文，可重复或用逗号分隔
    #[arg(short = 'u', long = "user", value_name = "x", action = ArgAction::Append, value_delimiter = ',')]
    pub users: Option<Vec<String>>,

    /// 每个用户查询的推文数量
    #[arg(
        short = 'c',
        long,
        value_name = "x",
        value_parser = clap::value_parser!(u32).range((MIN_TWEET_COUNT as i64)..=(MAX_TWEET_COUNT as i64))
    )]
    pub count: Option<u32>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct StreamArgs {
    /// 过滤流规则，每条规则一个 -r
    #[arg(short = 'r', long = "rule", value_name = "rule", action = ArgAction::Append)]
    pub rules: Option<Vec<String>>,

    /// 与 --rule 按顺序一一对应的标签
    #[arg(short = 't', long = "tag", value_name = "tag", action = ArgAction::Append)]
    pub tags: Option<Vec<String>>,

    /// 读取时长，格式 XmYs，-1 表示不限时
    #[arg(
        short = 'd',
        long,
        value_name = "XmYs",
        allow_hyphen_values = true,
        value_parser = parse_duration_arg
    )]
    pub duration: Option<String>,
}

fn parse_duration_arg(value: &str) -> Result<String, String> {
    parse_stream_duration(value)?;
    Ok(value.trim().to_string())
}

#[derive(Args, Debug, Default, Clone, Copy)]
pub struct MiscArgs {
    /// 只把选项写入配置文件，不运行服务
    #[arg(long)]
    pub update_settings: bool,

    /// 忽略本次选项，直接使用配置文件中的设置
    #[arg(long)]
    pub use_previous: bool,
}

#[derive(Args, Debug, Default)]
pub struct UserTweetArgs {
    #[command(flatten)]
    pub user: UserArgs,

    #[command(flatten)]
    pub user_fields: UserFieldArgs,

    #[command(flatten)]
    pub tweet_fields: TweetFieldArgs,

    #[command(flatten)]
    pub misc: MiscArgs,
}

#[derive(Args, Debug, Default)]
pub struct StreamTweetArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    #[command(flatten)]
    pub misc: MiscArgs,
}

/// 用户查询字段开关，指定即移除该字段
#[derive(Args, Debug, Default)]
#[command(next_help_heading = "User query fields")]
pub struct UserFieldArgs {
    #[arg(long = "u_created_at", id = "u_created_at")]
    pub created_at: bool,
    #[arg(long = "u_description", id = "u_description")]
    pub description: bool,
    #[arg(long = "u_entities", id = "u_entities")]
    pub entities: bool,
    #[arg(long = "u_id", id = "u_id")]
    pub id: bool,
    #[arg(long = "u_location", id = "u_location")]
    pub location: bool,
    #[arg(long = "u_name", id = "u_name")]
    pub name: bool,
    #[arg(long = "u_pinned_tweet_id", id = "u_pinned_tweet_id")]
    pub pinned_tweet_id: bool,
    #[arg(long = "u_profile_image_url", id = "u_profile_image_url")]
    pub profile_image_url: bool,
    #[arg(long = "u_protected", id = "u_protected")]
    pub protected: bool,
    #[arg(long = "u_public_metrics", id = "u_public_metrics")]
    pub public_metrics: bool,
    #[arg(long = "u_url", id = "u_url")]
    pub url: bool,
    #[arg(long = "u_username", id = "u_username")]
    pub username: bool,
    #[arg(long = "u_verified", id = "u_verified")]
    pub verified: bool,
    #[arg(long = "u_withheld", id = "u_withheld")]
    pub withheld: bool,
}

impl UserFieldArgs {
    /// 本次指定要修改的字段及其新值
    pub fn toggles(&self) -> Vec<(&'static str, bool)> {
        [
            ("created_at", self.created_at),
            ("description", self.description),
            ("entities", self.entities),
            ("id", self.id),
            ("location", self.location),
            ("name", self.name),
            ("pinned_tweet_id", self.pinned_tweet_id),
            ("profile_image_url", self.profile_image_url),
            ("protected", self.protected),
            ("public_metrics", self.public_metrics),
            ("url", self.url),
            ("username", self.username),
            ("verified", self.verified),
            ("withheld", self.withheld),
        ]
        .into_iter()
        .filter(|(_, given)| *given)
        .map(|(name, _)| (name, false))
        .collect()
    }
}

/// 推文查询字段开关
///
/// 三个 metrics 字段默认不查询，指定即加入；其余字段指定即移除
#[derive(Args, Debug, Default)]
#[command(next_help_heading = "Tweet query fields")]
pub struct TweetFieldArgs {
    #[arg(long = "t_attachments", id = "t_attachments")]
    pub attachments: bool,
    #[arg(long = "t_author_id", id = "t_author_id")]
    pub author_id: bool,
    #[arg(long = "t_context_annotations", id = "t_context_annotations")]
    pub context_annotations: bool,
    #[arg(long = "t_conversation_id", id = "t_conversation_id")]
    pub conversation_id: bool,
    #[arg(long = "t_created_at", id = "t_created_at")]
    pub created_at: bool,
    #[arg(long = "t_entities", id = "t_entities")]
    pub entities: bool,
    #[arg(long = "t_geo", id = "t_geo")]
    pub geo: bool,
    #[arg(long = "t_id", id = "t_id")]
    pub id: bool,
    #[arg(long = "t_in_reply_to_user_id", id = "t_in_reply_to_user_id")]
    pub in_reply_to_user_id: bool,
    #[arg(long = "t_lang", id = "t_lang")]
    pub lang: bool,
    #[arg(long = "t_non_public_metrics", id = "t_non_public_metrics")]
    pub non_public_metrics: bool,
    #[arg(long = "t_organic_metrics", id = "t_organic_metrics")]
    pub organic_metrics: bool,
    #[arg(long = "t_possibly_sensitive", id = "t_possibly_sensitive")]
    pub possibly_sensitive: bool,
    #[arg(long = "t_promoted_metrics", id = "t_promoted_metrics")]
    pub promoted_metrics: bool,
    #[arg(long = "t_public_metrics", id = "t_public_metrics")]
    pub public_metrics: bool,
    #[arg(long = "t_referenced_tweets", id = "t_referenced_tweets")]
    pub referenced_tweets: bool,
    #[arg(long = "t_source", id = "t_source")]
    pub source: bool,
    #[arg(long = "t_text", id = "t_text")]
    pub text: bool,
    #[arg(long = "t_withheld", id = "t_withheld")]
    pub withheld: bool,
}

impl TweetFieldArgs {
    pub fn toggles(&self) -> Vec<(&'static str, bool)> {
        // (字段名, 是否指定, 指定后的值)
        [
            ("attachments", self.attachments, false),
            ("author_id", self.author_id, false),
            ("context_annotations", self.context_annotations, false),
            ("conversation_id", self.conversation_id, false),
            ("created_at", self.created_at, false),
            ("entities", self.entities, false),
            ("geo", self.geo, false),
            ("id", self.id, false),
            ("in_reply_to_user_id", self.in_reply_to_user_id, false),
            ("lang", self.lang, false),
            ("non_public_metrics", self.non_public_metrics, true),
            ("organic_metrics", self.organic_metrics, true),
            ("possibly_sensitive", self.possibly_sensitive, false),
            ("promoted_metrics", self.promoted_metrics, true),
            ("public_metrics", self.public_metrics, false),
            ("referenced_tweets", self.referenced_tweets, false),
            ("source", self.source, false),
            ("text", self.text, false),
            ("withheld", self.withheld, false),
        ]
        .into_iter()
        .filter(|(_, given, _)| *given)
        .map(|(name, _, value)| (name, value))
        .collect()
    }
}

/// 本次运行要做什么
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub run_stream: bool,
    pub run_user: bool,
    /// 是否把合并后的配置写回文件
    pub persist: bool,
    /// `--update-settings` 时只写配置不运行
    pub execute: bool,
}

impl UserArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(users) = &self.users {
            config.user_tweet.users = users.clone();
        }
        if let Some(count) = self.count {
            config.user_tweet.count = count;
        }
    }
}

impl StreamArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(rules) = &self.rules {
            config.stream_tweet.rules = rules.clone();
        }
        if let Some(tags) = &self.tags {
            config.stream_tweet.tags = tags.clone();
        }
        if let Some(duration) = &self.duration {
            config.stream_tweet.duration = duration.clone();
        }
    }
}

impl Cli {
    /// 顶层与子命令中的 misc 选项任一处指定即生效
    fn misc(&self) -> MiscArgs {
        let sub = match &self.command {
            Some(Command::Usertweet(args)) => args.misc,
            Some(Command::Streamtweet(args)) => args.misc,
            None => MiscArgs::default(),
        };
        MiscArgs {
            update_settings: self.misc.update_settings || sub.update_settings,
            use_previous: self.misc.use_previous || sub.use_previous,
        }
    }

    /// 把命令行选项合并进配置，返回运行计划
    pub fn apply(&self, config: &mut Config) -> RunPlan {
        let misc = self.misc();

        if !misc.use_previous {
            self.user.apply(config);
            self.stream.apply(config);

            match &self.command {
                Some(Command::Usertweet(args)) => {
                    args.user.apply(config);
                    for (name, value) in args.user_fields.toggles() {
                        config.user_fields.insert(name.to_string(), value);
                    }
                    for (name, value) in args.tweet_fields.toggles() {
                        config.tweet_fields.insert(name.to_string(), value);
                    }
                }
                Some(Command::Streamtweet(args)) => args.stream.apply(config),
                None => {}
            }
        }

        let (run_stream, run_user) = match &self.command {
            Some(Command::Usertweet(_)) => (false, true),
            Some(Command::Streamtweet(_)) => (true, false),
            None => (config.services.stream_tweet, config.services.user_tweet),
        };

        RunPlan {
            run_stream,
            run_user,
            persist: !misc.use_previous,
            execute: !misc.update_settings,
        }
    }
}
