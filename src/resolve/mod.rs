/*!
 * Episode link resolution.
 *
 * A direct media URL is recovered through four sequential stages, each
 * feeding the next:
 *
 * 1. embed   - pick the embed link for the preferred quality off the
 *              episode's play page
 * 2. player  - extract the player URL from the embed page's scripts
 * 3. token   - fetch the player page, capture its session cookie, and
 *              deobfuscate the packed script for the redirect token
 * 4. redirect - trade token + session for the direct URL through the
 *              external resolver
 *
 * `LinkResolutionPipeline` drives the chain; the stage modules hold
 * the individual parsers and clients.
 */

pub mod deobfuscate;
pub mod embed;
pub mod pipeline;
pub mod player;
pub mod redirect;
pub mod token;

pub use pipeline::LinkResolutionPipeline;
