pub mod books;
pub mod events;
pub mod notifications;
pub mod orders;
pub mod users;

use bookstore_events::ChannelBroadcaster;
use bookstore_kernel::ModuleRegistry;

use crate::context::SharedContext;

/// Register every domain module. Users come first so default administrators
/// exist before anything else starts; orders come last so they stop first
/// and drain their side effects while the other modules are still up.
pub fn register_all(
    registry: &mut ModuleRegistry,
    ctx: &SharedContext,
    channel: &ChannelBroadcaster,
) {
    registry.register(users::create_module(ctx.clone()));
    registry.register(books::create_module(ctx.clone()));
    registry.register(events::create_module(channel.clone()));
    registry.register(notifications::create_module(ctx.clone()));
    registry.register(orders::create_module(ctx.clone()));
}
