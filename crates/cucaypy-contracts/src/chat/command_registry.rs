/// How a slash command consumes the text after its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArgKind {
    None,
    /// One path, shell-quoted if it contains spaces, stored under the key.
    Path(&'static str),
    /// The rest of the line verbatim, stored under the key.
    Raw(&'static str),
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
    pub arg: ArgKind,
}

const fn spec(command: &'static str, action: &'static str, arg: ArgKind) -> CommandSpec {
    CommandSpec {
        command,
        action,
        arg,
    }
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    spec("files", "list_files", ArgKind::None),
    spec("open", "select_file", ArgKind::Path("path")),
    spec("analyze", "analyze", ArgKind::None),
    spec("image", "attach_image", ArgKind::Path("path")),
    spec("clear_image", "clear_image", ArgKind::None),
    spec("status", "status", ArgKind::None),
    spec("history", "history", ArgKind::None),
    spec("model", "set_model", ArgKind::Raw("model")),
    spec("save", "save", ArgKind::None),
    spec("help", "help", ArgKind::None),
];

pub(crate) fn command_spec(command: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.command == command)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuickAction {
    pub command: &'static str,
    pub label: &'static str,
    pub prompt: &'static str,
}

pub const QUICK_ACTIONS: &[QuickAction] = &[
    QuickAction {
        command: "add_image",
        label: "Add Image",
        prompt: "Insert a nice placeholder image (from unsplash source or similar) into the main section with a modern border-radius and shadow.",
    },
    QuickAction {
        command: "add_navbar",
        label: "Add Navbar",
        prompt: "Create a responsive navigation bar with a logo and links for Home, About, and Contact.",
    },
    QuickAction {
        command: "fix_styles",
        label: "Fix Styles",
        prompt: "Review the CSS and fix any spacing, alignment, or color consistency issues to make it look professional.",
    },
    QuickAction {
        command: "mobile_fix",
        label: "Mobile Fix",
        prompt: "Ensure the layout is fully responsive and looks great on mobile devices.",
    },
    QuickAction {
        command: "add_footer",
        label: "Add Footer",
        prompt: "Add a footer with copyright info and social media links at the bottom.",
    },
    QuickAction {
        command: "debug",
        label: "Debug",
        prompt: "Check for any potential logic errors or syntax issues and fix them.",
    },
];

pub fn quick_action(command: &str) -> Option<&'static QuickAction> {
    QUICK_ACTIONS.iter().find(|action| action.command == command)
}

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/files",
    "/open",
    "/analyze",
    "/image",
    "/clear_image",
    "/status",
    "/history",
    "/model",
    "/save",
    "/help",
    "/add_image",
    "/add_navbar",
    "/fix_styles",
    "/mobile_fix",
    "/add_footer",
    "/debug",
];
