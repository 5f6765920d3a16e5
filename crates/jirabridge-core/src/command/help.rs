pub const HELP_TEXT_HEADER: &str = "###### Jira Bridge - Slash Command Help\n";

pub fn common_help_text(trigger: &str) -> String {
    format!(
        "\n* `/{trigger} connect [--instance <jiraURL>]` - Connect your chat account to your Jira account\
         \n* `/{trigger} disconnect [--instance <jiraURL>]` - Disconnect your chat account from your Jira account\
         \n* `/{trigger} assign <issue-key> <@user>` - Assign a Jira issue to a connected user\
         \n* `/{trigger} instance list` - List installed Jira instances\
         \n* `/{trigger} instance settings [setting] [value]` - Update your user settings\
         \n  * [setting] can be `notifications`\
         \n  * [value] can be `on` or `off`\
         \n* `/{trigger} settings [setting] [value]` - Same as `/{trigger} instance settings`\
         \n* `/{trigger} help` - Launch the Jira plugin command line help syntax\
         \n"
    )
}

pub fn sysadmin_help_text(trigger: &str) -> String {
    format!(
        "\n###### For System Administrators:\
         \nInstall Jira instances:\
         \n* `/{trigger} install cloud <URL>` - Connect a Jira Cloud instance\
         \n* `/{trigger} install server <URL>` - Connect a Jira Server or Data Center instance\
         \n* `/{trigger} instance oauth <client-id> <client-secret> [--instance <URL>]` - Set the OAuth 2.0 application link credentials of a Jira Server instance\
         \nUninstall Jira instances:\
         \n* `/{trigger} uninstall cloud <URL>` - Disconnect a Jira Cloud instance\
         \n* `/{trigger} uninstall server <URL>` - Disconnect a Jira Server or Data Center instance\
         \n"
    )
}

/// Administrators also see the installation commands.
pub fn help_text(trigger: &str, include_sysadmin: bool) -> String {
    let mut text = String::from(HELP_TEXT_HEADER);
    text.push_str(&common_help_text(trigger));
    if include_sysadmin {
        text.push_str(&sysadmin_help_text(trigger));
    }
    text.trim().to_string()
}
