mod checkout;
mod helpers;
mod mocks;
mod outbox;
mod plugin;
mod webhook;
